//! Path pattern compilation and specificity scoring.
//!
//! # Responsibilities
//! - Parse a route path (`"users/:id?/*"`) into typed segments
//! - Explode optional segments into concrete variants
//! - Score a branch's concatenated segments
//!
//! # Scoring
//! ```text
//! root                 +2
//! static segment       +1 +10
//! required dynamic     +1 +3
//! optional static      (+1 if present) +6
//! optional dynamic     (+1 if present) +2
//! splat                +1, branch -2
//! index route          +2
//! ```
//! Optional segments carry their weight whether or not the exploded variant
//! includes them, so an optional static always outranks an optional dynamic.
//!
//! # Design Decisions
//! - No regex: segments are compared one by one
//! - A splat is only legal as the final segment

use std::fmt;

const ROOT_VALUE: i32 = 2;
const SEGMENT_VALUE: i32 = 1;
const STATIC_VALUE: i32 = 10;
const DYNAMIC_VALUE: i32 = 3;
const OPTIONAL_STATIC_VALUE: i32 = 6;
const OPTIONAL_DYNAMIC_VALUE: i32 = 2;
const INDEX_VALUE: i32 = 2;
const SPLAT_PENALTY: i32 = -2;

/// Parameter name a trailing splat is stored under.
pub const SPLAT_PARAM: &str = "*";

/// One `/`-separated piece of a route path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Static(String),
    Dynamic(String),
    OptionalStatic(String),
    OptionalDynamic(String),
    Splat,
}

impl Segment {
    pub fn is_optional(&self) -> bool {
        matches!(self, Segment::OptionalStatic(_) | Segment::OptionalDynamic(_))
    }

    fn weight(&self) -> i32 {
        match self {
            Segment::Static(_) => STATIC_VALUE,
            Segment::Dynamic(_) => DYNAMIC_VALUE,
            Segment::OptionalStatic(_) => OPTIONAL_STATIC_VALUE,
            Segment::OptionalDynamic(_) => OPTIONAL_DYNAMIC_VALUE,
            Segment::Splat => 0,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Static(s) => write!(f, "{s}"),
            Segment::Dynamic(name) => write!(f, ":{name}"),
            Segment::OptionalStatic(s) => write!(f, "{s}?"),
            Segment::OptionalDynamic(name) => write!(f, ":{name}?"),
            Segment::Splat => f.write_str("*"),
        }
    }
}

/// A compiled route path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    source: String,
    segments: Vec<Segment>,
}

/// Why a path failed to compile.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct PatternError(pub String);

impl PathPattern {
    /// Compile a path relative to its parent (no leading slash required).
    pub fn parse(path: &str) -> Result<Self, PatternError> {
        let raw: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut segments = Vec::with_capacity(raw.len());

        for (i, seg) in raw.iter().enumerate() {
            let segment = parse_segment(seg)?;
            if segment == Segment::Splat && i + 1 != raw.len() {
                return Err(PatternError(format!(
                    "`*` must be the last segment in route path \"{path}\""
                )));
            }
            segments.push(segment);
        }

        Ok(Self {
            source: path.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn has_splat(&self) -> bool {
        matches!(self.segments.last(), Some(Segment::Splat))
    }

    /// Expand optional segments into every concrete variant, longest first.
    ///
    /// `a/:b?/c?` yields `[a,:b?,c?]`, `[a,:b?]`, `[a,c?]`, `[a]`. Present
    /// optional segments keep their optional variant so scoring can tell them
    /// apart; absent ones are recorded separately.
    pub fn explode(&self) -> Vec<PatternVariant> {
        let mut variants = vec![PatternVariant::default()];
        for segment in &self.segments {
            let mut next = Vec::with_capacity(variants.len() * 2);
            for variant in &variants {
                let mut with = variant.clone();
                with.segments.push(segment.clone());
                next.push(with);
                if segment.is_optional() {
                    let mut without = variant.clone();
                    without.absent.push(segment.clone());
                    next.push(without);
                }
            }
            variants = next;
        }
        variants
    }
}

/// One concrete shape of a pattern after optional explosion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternVariant {
    /// Segments that must be present in the pathname.
    pub segments: Vec<Segment>,
    /// Optional segments left out of this variant.
    pub absent: Vec<Segment>,
}

fn parse_segment(seg: &str) -> Result<Segment, PatternError> {
    if seg == "*" {
        return Ok(Segment::Splat);
    }
    let (body, optional) = match seg.strip_suffix('?') {
        Some(body) => (body, true),
        None => (seg, false),
    };
    if let Some(name) = body.strip_prefix(':') {
        if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
            return Err(PatternError(format!("invalid parameter name in segment \"{seg}\"")));
        }
        return Ok(if optional {
            Segment::OptionalDynamic(name.to_string())
        } else {
            Segment::Dynamic(name.to_string())
        });
    }
    if body.is_empty() || body.contains('*') {
        return Err(PatternError(format!("invalid segment \"{seg}\"")));
    }
    Ok(if optional {
        Segment::OptionalStatic(body.to_string())
    } else {
        Segment::Static(body.to_string())
    })
}

/// Score a flattened branch from its per-route variants.
pub fn score_branch<'a>(variants: impl IntoIterator<Item = &'a PatternVariant>, index: bool) -> i32 {
    let mut score = ROOT_VALUE;
    let mut splat = false;
    for variant in variants {
        for segment in &variant.segments {
            score += SEGMENT_VALUE + segment.weight();
            splat |= *segment == Segment::Splat;
        }
        score += variant.absent.iter().map(Segment::weight).sum::<i32>();
    }
    if splat {
        score += SPLAT_PENALTY;
    }
    if index {
        score += INDEX_VALUE;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(path: &str) -> i32 {
        let pattern = PathPattern::parse(path).unwrap();
        let variants = pattern.explode();
        score_branch([&variants[0]], false)
    }

    #[test]
    fn test_parse_segments() {
        let pattern = PathPattern::parse("/users/:id?/files/*").unwrap();
        assert_eq!(
            pattern.segments(),
            &[
                Segment::Static("users".into()),
                Segment::OptionalDynamic("id".into()),
                Segment::Static("files".into()),
                Segment::Splat,
            ]
        );
        assert!(pattern.has_splat());
    }

    #[test]
    fn test_rejects_bad_patterns() {
        assert!(PathPattern::parse("a/*/b").is_err());
        assert!(PathPattern::parse("a/:").is_err());
        assert!(PathPattern::parse("a/b*").is_err());

        let err: Box<dyn std::error::Error> = Box::new(PathPattern::parse("a/:").unwrap_err());
        assert_eq!(err.to_string(), "invalid parameter name in segment \":\"");
    }

    #[test]
    fn test_static_beats_dynamic_beats_splat() {
        assert!(score("/a/b") > score("/a/:b"));
        assert!(score("/a/:b") > score("/a/*"));
    }

    #[test]
    fn test_optional_static_preferred_over_optional_dynamic() {
        assert!(score("/a/b?") > score("/a/:b?"));
        // Required segments still outrank their optional forms.
        assert!(score("/a/b") > score("/a/b?"));
        assert!(score("/a/:b") > score("/a/:b?"));
    }

    #[test]
    fn test_explode_optional() {
        let pattern = PathPattern::parse("a/:b?/c?").unwrap();
        let variants = pattern.explode();
        assert_eq!(variants.len(), 4);
        assert_eq!(variants[0].segments.len(), 3);
        assert_eq!(variants[3].segments, vec![Segment::Static("a".into())]);
        assert_eq!(variants[3].absent.len(), 2);

        // Absent optionals still weigh in.
        let full = score_branch([&variants[0]], false);
        let bare = score_branch([&variants[3]], false);
        assert_eq!(full - bare, 2 * SEGMENT_VALUE);
    }
}
