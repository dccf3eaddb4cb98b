//! Form submissions.

use http::Method;
use serde_json::Value;
use url::form_urlencoded;

/// Ordered form fields; keys may repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData(Vec<(String, String)>);

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.append(key, value);
        self
    }

    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.0.iter().filter(|(k, _)| k == key).map(|(_, v)| v.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `application/x-www-form-urlencoded` serialization.
    pub fn to_query(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.0.iter())
            .finish()
    }

    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self(form_urlencoded::parse(query.as_bytes()).into_owned().collect())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormData {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Body encoding of a submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FormEncType {
    #[default]
    UrlEncoded,
    Multipart,
    Json,
    Text,
}

impl FormEncType {
    pub fn content_type(&self) -> &'static str {
        match self {
            FormEncType::UrlEncoded => "application/x-www-form-urlencoded",
            FormEncType::Multipart => "multipart/form-data",
            FormEncType::Json => "application/json",
            FormEncType::Text => "text/plain",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionBody {
    Form(FormData),
    Json(Value),
    Text(String),
}

/// A navigation or fetch that carries a body.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub form_method: Method,
    /// Href the submission targets; filled in by the router when resolving.
    pub form_action: String,
    pub form_enc_type: FormEncType,
    pub body: SubmissionBody,
}

impl Submission {
    pub fn form(method: Method, data: FormData) -> Self {
        Self {
            form_method: method,
            form_action: String::new(),
            form_enc_type: FormEncType::UrlEncoded,
            body: SubmissionBody::Form(data),
        }
    }

    pub fn json(method: Method, value: Value) -> Self {
        Self {
            form_method: method,
            form_action: String::new(),
            form_enc_type: FormEncType::Json,
            body: SubmissionBody::Json(value),
        }
    }

    pub fn text(method: Method, text: impl Into<String>) -> Self {
        Self {
            form_method: method,
            form_action: String::new(),
            form_enc_type: FormEncType::Text,
            body: SubmissionBody::Text(text.into()),
        }
    }

    pub fn is_mutation(&self) -> bool {
        is_mutation_method(&self.form_method)
    }

    pub fn form_data(&self) -> Option<&FormData> {
        match &self.body {
            SubmissionBody::Form(data) => Some(data),
            _ => None,
        }
    }
}

pub fn is_mutation_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_data_query() {
        let data = FormData::new().with("q", "rust lang").with("tag", "a").with("tag", "b");
        assert_eq!(data.to_query(), "q=rust+lang&tag=a&tag=b");
        assert_eq!(data.get_all("tag"), vec!["a", "b"]);

        let parsed = FormData::from_query("?q=rust+lang&tag=a&tag=b");
        assert_eq!(parsed, data);
    }

    #[test]
    fn test_mutation_methods() {
        assert!(Submission::form(Method::POST, FormData::new()).is_mutation());
        assert!(Submission::json(Method::DELETE, Value::Null).is_mutation());
        assert!(!Submission::form(Method::GET, FormData::new()).is_mutation());
    }
}
