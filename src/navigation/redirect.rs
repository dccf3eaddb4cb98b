//! Redirect target resolution.
//!
//! # Rules
//! - `x-router-reload-document` always leaves the application
//! - Absolute and protocol-relative URLs stay internal only when origin and
//!   basename match; the pathname is then routed as-is
//! - Root-relative targets are app-relative and get the basename prepended
//! - Relative targets resolve against the matches up to the originating route
//! - Search and hash are kept verbatim

use url::Url;

use crate::navigation::history::HistoryAction;
use crate::navigation::location::{Location, Path};
use crate::routing::path::{prepend_basename, resolve_to, strip_basename, RelativeRouting};

/// Hands external redirects to whoever owns real page navigation.
pub trait DocumentNavigator: Send + Sync {
    fn navigate(&self, href: &str, replace: bool);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectTarget {
    /// Route inside the application (pathname carries the basename).
    Internal(Path),
    /// Leave the application.
    External(String),
}

pub(crate) struct RedirectContext<'a> {
    pub origin: &'a Url,
    pub basename: &'a str,
    /// `pathname_base` of path-contributing matches up to the originating route.
    pub route_pathnames: &'a [String],
    /// Current pathname with the basename stripped.
    pub location_pathname: &'a str,
}

pub(crate) fn resolve_redirect(location: &str, reload_document: bool, cx: &RedirectContext<'_>) -> RedirectTarget {
    let absolute = if location.starts_with("//") {
        Url::parse(&format!("{}:{location}", cx.origin.scheme())).ok()
    } else {
        Url::parse(location).ok()
    };

    if let Some(url) = absolute {
        let same_origin = url.origin() == cx.origin.origin();
        if reload_document || !same_origin || strip_basename(url.path(), cx.basename).is_none() {
            return RedirectTarget::External(url.to_string());
        }
        let mut path = Path {
            pathname: url.path().to_string(),
            search: url.query().map(|q| format!("?{q}")).unwrap_or_default(),
            hash: url.fragment().map(|f| format!("#{f}")).unwrap_or_default(),
        };
        if path.search == "?" {
            path.search.clear();
        }
        return RedirectTarget::Internal(path);
    }

    let mut path = resolve_to(location, cx.route_pathnames, cx.location_pathname, RelativeRouting::Route);
    path.pathname = prepend_basename(&path.pathname, cx.basename);
    if reload_document {
        return match cx.origin.join(&path.to_href()) {
            Ok(url) => RedirectTarget::External(url.to_string()),
            Err(_) => RedirectTarget::External(path.to_href()),
        };
    }
    RedirectTarget::Internal(path)
}

/// Replace when asked to, or when the target is where the user already is.
pub(crate) fn redirect_history_action(target: &Path, current: &Location, replace: bool) -> HistoryAction {
    let same = target.pathname == current.pathname && target.search == current.search;
    if replace || same {
        HistoryAction::Replace
    } else {
        HistoryAction::Push
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cx<'a>(origin: &'a Url, basename: &'a str, routes: &'a [String]) -> RedirectContext<'a> {
        RedirectContext {
            origin,
            basename,
            route_pathnames: routes,
            location_pathname: "/parent/child",
        }
    }

    #[test]
    fn test_relative_and_root_relative() {
        let origin = Url::parse("http://localhost").unwrap();
        let routes = vec!["/".to_string(), "/parent".to_string(), "/parent/child".to_string()];
        let c = cx(&origin, "/", &routes);
        assert_eq!(
            resolve_redirect("../other?x=1#h", false, &c),
            RedirectTarget::Internal(Path::parse("/parent/other?x=1#h"))
        );
        assert_eq!(resolve_redirect("/login", false, &c), RedirectTarget::Internal(Path::parse("/login")));

        let c = cx(&origin, "/app", &routes);
        assert_eq!(resolve_redirect("/login", false, &c), RedirectTarget::Internal(Path::parse("/app/login")));
    }

    #[test]
    fn test_absolute_urls() {
        let origin = Url::parse("http://localhost").unwrap();
        let routes = vec!["/".to_string()];
        let c = cx(&origin, "/", &routes);
        assert_eq!(
            resolve_redirect("http://localhost/a?b=1", false, &c),
            RedirectTarget::Internal(Path::parse("/a?b=1"))
        );
        assert_eq!(
            resolve_redirect("https://example.com/a", false, &c),
            RedirectTarget::External("https://example.com/a".into())
        );
        assert_eq!(
            resolve_redirect("//example.com/a", false, &c),
            RedirectTarget::External("http://example.com/a".into())
        );
        assert_eq!(
            resolve_redirect("/a", true, &c),
            RedirectTarget::External("http://localhost/a".into())
        );

        let c = cx(&origin, "/app", &routes);
        assert!(matches!(resolve_redirect("http://localhost/other", false, &c), RedirectTarget::External(_)));
    }

    #[test]
    fn test_redirect_to_current_location_replaces() {
        let current = Location::new("/a?x=1");
        assert_eq!(redirect_history_action(&Path::parse("/a?x=1"), &current, false), HistoryAction::Replace);
        assert_eq!(redirect_history_action(&Path::parse("/b"), &current, false), HistoryAction::Push);
        assert_eq!(redirect_history_action(&Path::parse("/b"), &current, true), HistoryAction::Replace);
    }
}
