//! Pathname utilities: joining, basename handling, relative resolution and
//! segment decoding.

use percent_encoding::percent_decode_str;

use crate::navigation::location::Path;

/// How `..` is interpreted in a relative target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RelativeRouting {
    /// `..` climbs to the parent route's pathname.
    #[default]
    Route,
    /// `..` removes one URL segment.
    Path,
}

/// Join path pieces, collapsing duplicate slashes.
pub fn join_paths<S: AsRef<str>>(paths: &[S]) -> String {
    let joined = paths.iter().map(|p| p.as_ref()).collect::<Vec<_>>().join("/");
    let mut out = String::with_capacity(joined.len());
    let mut last_slash = false;
    for c in joined.chars() {
        if c == '/' {
            if !last_slash {
                out.push(c);
            }
            last_slash = true;
        } else {
            out.push(c);
            last_slash = false;
        }
    }
    out
}

/// Remove `basename` from the front of `pathname`, case-insensitively.
///
/// Returns `None` when the pathname lives outside the basename.
pub fn strip_basename(pathname: &str, basename: &str) -> Option<String> {
    if basename == "/" || basename.is_empty() {
        return Some(pathname.to_string());
    }
    if !pathname.to_lowercase().starts_with(&basename.to_lowercase()) {
        return None;
    }
    let base = basename.trim_end_matches('/');
    let rest = &pathname[base.len()..];
    if !rest.is_empty() && !rest.starts_with('/') {
        return None;
    }
    Some(if rest.is_empty() { "/".to_string() } else { rest.to_string() })
}

/// Prefix a router-relative pathname with the basename.
pub fn prepend_basename(pathname: &str, basename: &str) -> String {
    if basename == "/" || basename.is_empty() {
        return pathname.to_string();
    }
    if pathname == "/" {
        return basename.to_string();
    }
    join_paths(&[basename, pathname])
}

/// Resolve `to` against an absolute `from` pathname, honoring `.` and `..`.
pub fn resolve_path(to: &Path, from: &str) -> Path {
    let pathname = if to.pathname.is_empty() {
        from.to_string()
    } else if to.pathname.starts_with('/') {
        resolve_pathname(&to.pathname, "/")
    } else {
        resolve_pathname(&to.pathname, from)
    };
    Path {
        pathname,
        search: to.search.clone(),
        hash: to.hash.clone(),
    }
}

fn resolve_pathname(relative: &str, from: &str) -> String {
    let trimmed = from.trim_end_matches('/');
    let mut segments: Vec<&str> = trimmed.split('/').collect();
    for segment in relative.split('/') {
        match segment {
            ".." => {
                if segments.len() > 1 {
                    segments.pop();
                }
            }
            "." => {}
            s => segments.push(s),
        }
    }
    if segments.len() > 1 {
        join_paths(&segments)
    } else {
        "/".to_string()
    }
}

/// Resolve a navigation target.
///
/// `route_pathnames` are the pathname bases of the path-contributing matches
/// known to the caller, root first. In route mode a leading run of `..`
/// climbs that list; in path mode it climbs the URL of `location_pathname`.
pub fn resolve_to(
    to: &str,
    route_pathnames: &[String],
    location_pathname: &str,
    relative: RelativeRouting,
) -> Path {
    let mut target = Path::parse(to);
    let is_empty_path = to.is_empty() || target.pathname.is_empty();
    let to_pathname = if is_empty_path { None } else { Some(target.pathname.clone()) };

    let from = match &to_pathname {
        None => location_pathname.to_string(),
        Some(_) if relative == RelativeRouting::Path => location_pathname.to_string(),
        Some(pathname) => {
            let mut idx = route_pathnames.len() as isize - 1;
            if !pathname.starts_with('/') && pathname.starts_with("..") {
                let mut segments: Vec<&str> = pathname.split('/').collect();
                while segments.first() == Some(&"..") {
                    segments.remove(0);
                    idx -= 1;
                }
                target.pathname = segments.join("/");
            }
            if idx >= 0 {
                route_pathnames[idx as usize].clone()
            } else {
                "/".to_string()
            }
        }
    };

    if is_empty_path {
        target.pathname = String::new();
    }
    let mut path = resolve_path(&target, &from);

    // Keep an explicit trailing slash from the target.
    let explicit_trailing = to_pathname
        .as_deref()
        .map(|p| p != "/" && p.ends_with('/'))
        .unwrap_or(false);
    let current_trailing = (is_empty_path || to_pathname.as_deref() == Some("."))
        && location_pathname.ends_with('/');
    if !path.pathname.ends_with('/') && (explicit_trailing || current_trailing) {
        path.pathname.push('/');
    }
    path
}

/// Decode a raw pathname segment (`%XX` escapes and `+` as space).
///
/// Falls back to the raw text with a warning when the bytes are not UTF-8.
pub fn decode_segment(raw: &str) -> String {
    let plus_decoded = raw.replace('+', " ");
    match percent_decode_str(&plus_decoded).decode_utf8() {
        Ok(decoded) => decoded.into_owned(),
        Err(e) => {
            tracing::warn!(
                segment = %raw,
                error = %e,
                "Malformed URL segment, using the raw value"
            );
            raw.to_string()
        }
    }
}
