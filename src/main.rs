//! data-router CLI
//!
//! Inspect a route configuration without running any handlers.
//!
//! ```text
//! data-router branches --config routes.toml
//! data-router match --config routes.toml /users/7 /about
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use data_router::config::load_config;
use data_router::observability::logging::init_logging;
use data_router::routing::{compile, RouteTree};

#[derive(Parser)]
#[command(name = "data-router")]
#[command(about = "Inspect data-router route configurations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the route each path resolves to
    Match {
        #[arg(short, long)]
        config: PathBuf,

        /// Pathnames to match (basename included)
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Print every flattened branch in rank order
    Branches {
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config_path = match &cli.command {
        Commands::Match { config, .. } | Commands::Branches { config } => config.clone(),
    };

    let config = load_config(&config_path)?;
    init_logging(&config.logging);
    tracing::info!(config = %config_path.display(), "data-router starting");

    let tree = RouteTree::new(compile(config.route_defs())?);

    match cli.command {
        Commands::Branches { .. } => {
            for branch in tree.branches() {
                println!("{:>5}  {:<30}  {}", branch.score(), branch.path(), branch.route_ids().join(" > "));
            }
        }
        Commands::Match { paths, .. } => {
            for path in paths {
                match tree.match_routes(&path, &config.basename) {
                    Some(matches) => {
                        let ids: Vec<&str> = matches.iter().map(|m| m.route_id()).collect();
                        let params = matches
                            .last()
                            .map(|m| {
                                m.params
                                    .iter()
                                    .map(|(k, v)| format!("{k}={v}"))
                                    .collect::<Vec<_>>()
                                    .join(", ")
                            })
                            .unwrap_or_default();
                        if params.is_empty() {
                            println!("{path}  ->  {}", ids.join(" > "));
                        } else {
                            println!("{path}  ->  {}  ({params})", ids.join(" > "));
                        }
                    }
                    None => println!("{path}  ->  no match"),
                }
            }
        }
    }

    Ok(())
}
