//! Requests handed to loaders and actions.

use http::Method;
use url::Url;

use crate::error::RouterError;
use crate::request::context::AbortSignal;
use crate::request::submission::{FormData, Submission};

/// One loader or action invocation's view of the navigation.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub submission: Option<Submission>,
    pub signal: AbortSignal,
}

impl Request {
    /// Build a request for `href` (pathname, search, hash) under `origin`.
    ///
    /// A mutation submission sets the method and body; anything else is a GET.
    pub fn new(
        origin: &Url,
        href: &str,
        signal: AbortSignal,
        submission: Option<Submission>,
    ) -> Result<Self, RouterError> {
        let url = origin
            .join(href)
            .map_err(|_| RouterError::InvalidUrl(href.to_string()))?;
        let submission = submission.filter(Submission::is_mutation);
        let method = submission
            .as_ref()
            .map(|s| s.form_method.clone())
            .unwrap_or(Method::GET);

        Ok(Self {
            method,
            url,
            submission,
            signal,
        })
    }

    pub fn form_data(&self) -> Option<&FormData> {
        self.submission.as_ref().and_then(Submission::form_data)
    }

    pub fn search_params(&self) -> FormData {
        FormData::from_query(self.url.query().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_request() {
        let origin = Url::parse("http://localhost").unwrap();
        let req = Request::new(&origin, "/a/b?x=1", AbortSignal::never(), None).unwrap();
        assert_eq!(req.method, Method::GET);
        assert_eq!(req.url.as_str(), "http://localhost/a/b?x=1");
        assert_eq!(req.search_params().get("x"), Some("1"));
    }

    #[test]
    fn test_mutation_request_keeps_body() {
        let origin = Url::parse("http://localhost").unwrap();
        let sub = Submission::form(Method::POST, FormData::new().with("a", "1"));
        let req = Request::new(&origin, "/form", AbortSignal::never(), Some(sub)).unwrap();
        assert_eq!(req.method, Method::POST);
        assert_eq!(req.form_data().and_then(|f| f.get("a")), Some("1"));

        let get = Submission::form(Method::GET, FormData::new());
        let req = Request::new(&origin, "/form", AbortSignal::never(), Some(get)).unwrap();
        assert_eq!(req.method, Method::GET);
        assert!(req.submission.is_none());
    }
}
