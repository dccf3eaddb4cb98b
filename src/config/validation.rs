//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the route tree is well formed (unique ids, nesting rules)
//! - Validate value ranges (`max_redirects > 0`, absolute origin)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RouterConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;
use url::Url;

use crate::config::schema::{RouteConfig, RouterConfig};
use crate::routing::path::join_paths;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("basename `{0}` must start with `/`")]
    Basename(String),

    #[error("origin `{0}` is not an absolute URL")]
    Origin(String),

    #[error("max_redirects must be greater than zero")]
    MaxRedirects,

    #[error("duplicate route id `{0}`")]
    DuplicateId(String),

    #[error("index route `{0}` must not have children")]
    IndexWithChildren(String),

    #[error("route `{route}`: absolute path `{path}` must start with its parent path `{parent}`")]
    AbsolutePath { route: String, path: String, parent: String },
}

pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !config.basename.starts_with('/') {
        errors.push(ValidationError::Basename(config.basename.clone()));
    }
    match Url::parse(&config.origin) {
        Ok(url) if !url.cannot_be_a_base() => {}
        _ => errors.push(ValidationError::Origin(config.origin.clone())),
    }
    if config.max_redirects == 0 {
        errors.push(ValidationError::MaxRedirects);
    }

    let mut ids = HashSet::new();
    validate_routes(&config.routes, "/", "", &mut ids, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_routes(
    routes: &[RouteConfig],
    parent_path: &str,
    position: &str,
    ids: &mut HashSet<String>,
    errors: &mut Vec<ValidationError>,
) {
    for (i, route) in routes.iter().enumerate() {
        let here = if position.is_empty() { i.to_string() } else { format!("{position}-{i}") };
        let label = route.id.clone().unwrap_or_else(|| here.clone());

        if let Some(id) = &route.id {
            if !ids.insert(id.clone()) {
                errors.push(ValidationError::DuplicateId(id.clone()));
            }
        }
        if route.index && !route.children.is_empty() {
            errors.push(ValidationError::IndexWithChildren(label.clone()));
        }

        let full_path = match route.path.as_deref() {
            Some(path) if path.starts_with('/') => {
                let parent = parent_path.trim_end_matches('/');
                let nested = path.starts_with(parent)
                    && (path.len() == parent.len() || path[parent.len()..].starts_with('/'));
                if !nested {
                    errors.push(ValidationError::AbsolutePath {
                        route: label.clone(),
                        path: path.to_string(),
                        parent: parent_path.to_string(),
                    });
                }
                path.to_string()
            }
            Some(path) => join_paths(&[parent_path, path]),
            None => parent_path.to_string(),
        };

        validate_routes(&route.children, &full_path, &here, ids, errors);
    }
}
