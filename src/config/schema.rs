//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::routing::RouteDef;

/// Root configuration for a router.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Prefix every location carries (e.g. "/app").
    pub basename: String,

    /// Origin used to build request URLs and spot external redirects.
    pub origin: String,

    /// Redirects followed by one navigation before it fails.
    pub max_redirects: u32,

    pub logging: LoggingConfig,

    /// The route tree.
    pub routes: Vec<RouteConfig>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            basename: "/".to_string(),
            origin: "http://localhost".to_string(),
            max_redirects: 20,
            logging: LoggingConfig::default(),
            routes: Vec::new(),
        }
    }
}

impl RouterConfig {
    /// Builder definitions for the configured tree, without handlers.
    pub fn route_defs(&self) -> Vec<RouteDef> {
        self.routes.iter().map(RouteConfig::to_def).collect()
    }
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level for this crate's events when `RUST_LOG` is unset.
    pub level: String,

    /// Include the event target in output.
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            with_target: false,
        }
    }
}

/// One route in the configured tree.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RouteConfig {
    pub id: Option<String>,
    pub path: Option<String>,
    pub index: bool,
    pub case_sensitive: bool,
    pub error_boundary: bool,
    /// Target every navigation to this route is redirected to.
    pub redirect: Option<String>,
    pub children: Vec<RouteConfig>,
}

impl RouteConfig {
    pub fn to_def(&self) -> RouteDef {
        let mut def = if self.index { RouteDef::index_route() } else { RouteDef::new() };
        if let Some(id) = &self.id {
            def = def.id(id.clone());
        }
        if let Some(path) = &self.path {
            def = def.path(path.clone());
        }
        if let Some(to) = &self.redirect {
            def = def.redirect(to.clone());
        }
        def.case_sensitive(self.case_sensitive)
            .error_boundary(self.error_boundary)
            .children(self.children.iter().map(RouteConfig::to_def))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: RouterConfig = toml::from_str("").unwrap();
        assert_eq!(config.basename, "/");
        assert_eq!(config.origin, "http://localhost");
        assert_eq!(config.max_redirects, 20);
        assert_eq!(config.logging.level, "info");
        assert!(config.routes.is_empty());
    }

    #[test]
    fn test_nested_routes() {
        let config: RouterConfig = toml::from_str(
            r#"
            basename = "/app"

            [[routes]]
            id = "root"
            path = "/"
            error_boundary = true

            [[routes.children]]
            id = "home"
            index = true

            [[routes.children]]
            id = "user"
            path = "users/:id"
            "#,
        )
        .unwrap();

        assert_eq!(config.basename, "/app");
        let root = &config.routes[0];
        assert!(root.error_boundary);
        assert_eq!(root.children.len(), 2);
        assert!(root.children[0].index);
        assert_eq!(root.children[1].path.as_deref(), Some("users/:id"));
        assert_eq!(config.route_defs().len(), 1);
    }
}
