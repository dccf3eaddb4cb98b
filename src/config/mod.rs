//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! routes.toml
//!     → loader.rs (read & deserialize)
//!     → validation.rs (semantic checks, every problem collected)
//!     → RouterConfig (validated, immutable)
//!     → RouterBuilder::from_config (handlers bound by route id)
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Handlers are code, so config only describes the tree; they are attached
//!   afterwards by id

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{LoggingConfig, RouteConfig, RouterConfig};
pub use validation::{validate_config, ValidationError};
