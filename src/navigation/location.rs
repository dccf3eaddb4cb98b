//! Locations and path strings.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A pathname with optional search and hash, as written in an href.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    pub pathname: String,
    /// Includes the leading `?` when non-empty.
    pub search: String,
    /// Includes the leading `#` when non-empty.
    pub hash: String,
}

impl Path {
    /// Split `"/a/b?x=1#top"` into its parts. A missing pathname stays empty.
    pub fn parse(path: &str) -> Self {
        let mut rest = path;
        let mut hash = String::new();
        let mut search = String::new();

        if let Some(idx) = rest.find('#') {
            hash = rest[idx..].to_string();
            rest = &rest[..idx];
        }
        if let Some(idx) = rest.find('?') {
            search = rest[idx..].to_string();
            rest = &rest[..idx];
        }

        Self {
            pathname: rest.to_string(),
            search: normalize_prefixed(search, '?'),
            hash: normalize_prefixed(hash, '#'),
        }
    }

    pub fn to_href(&self) -> String {
        format!("{}{}{}", self.pathname, self.search, self.hash)
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_href())
    }
}

// A lone "?" or "#" is the same as none.
fn normalize_prefixed(value: String, prefix: char) -> String {
    if value.len() == 1 && value.starts_with(prefix) {
        String::new()
    } else {
        value
    }
}

/// An entry in the history stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub pathname: String,
    pub search: String,
    pub hash: String,
    /// Opaque state supplied by the navigating caller.
    pub state: Option<Value>,
    /// Unique key per history entry.
    pub key: String,
}

impl Location {
    /// Create a fresh location (new key) from an href.
    pub fn new(href: &str) -> Self {
        Self::from_path(Path::parse(href), None)
    }

    pub fn from_path(path: Path, state: Option<Value>) -> Self {
        let pathname = if path.pathname.is_empty() {
            "/".to_string()
        } else {
            path.pathname
        };
        Self {
            pathname,
            search: path.search,
            hash: path.hash,
            state,
            key: create_key(),
        }
    }

    /// The default location of a freshly created history.
    pub fn root() -> Self {
        Self {
            pathname: "/".to_string(),
            search: String::new(),
            hash: String::new(),
            state: None,
            key: "default".to_string(),
        }
    }

    pub fn path(&self) -> Path {
        Path {
            pathname: self.pathname.clone(),
            search: self.search.clone(),
            hash: self.hash.clone(),
        }
    }

    pub fn to_href(&self) -> String {
        format!("{}{}{}", self.pathname, self.search, self.hash)
    }

    /// Pathname plus search, the part that identifies loaded data.
    pub fn path_and_search(&self) -> String {
        format!("{}{}", self.pathname, self.search)
    }

    /// True when `next` differs from `self` only by a non-empty hash.
    pub fn is_hash_change_only(&self, next: &Location) -> bool {
        self.pathname == next.pathname
            && self.search == next.search
            && !next.hash.is_empty()
            && self.hash != next.hash
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_href())
    }
}

fn create_key() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}
