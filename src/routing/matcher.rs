//! Route matching.
//!
//! # Responsibilities
//! - Flatten the route tree into ranked branches (once, at construction)
//! - Match a pathname against the branches, best score first
//! - Extract and decode parameters, compute matched pathnames
//!
//! # Design Decisions
//! - Static comparison is case-insensitive unless the route opts out
//! - Parameters are decoded once per segment; decode failures keep the raw text
//! - A splat consumes the remainder (possibly empty) into `*`
//! - Layout routes never form a branch on their own

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::routing::path::{decode_segment, strip_basename};
use crate::routing::pattern::{score_branch, PatternVariant, Segment, SPLAT_PARAM};
use crate::routing::route::{RouteKind, RouteNode};

/// Path parameters, merged child-over-parent across a branch.
pub type Params = BTreeMap<String, String>;

/// One route of a matched branch.
#[derive(Clone)]
pub struct RouteMatch {
    pub route: Arc<RouteNode>,
    pub params: Params,
    /// Portion of the pathname matched up to and including this route.
    pub pathname: String,
    /// Same as `pathname` without any splat portion.
    pub pathname_base: String,
}

impl RouteMatch {
    pub fn route_id(&self) -> &str {
        &self.route.id
    }
}

impl fmt::Debug for RouteMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMatch")
            .field("route", &self.route.id)
            .field("params", &self.params)
            .field("pathname", &self.pathname)
            .field("pathname_base", &self.pathname_base)
            .finish()
    }
}

impl PartialEq for RouteMatch {
    fn eq(&self, other: &Self) -> bool {
        self.route.id == other.route.id
            && self.params == other.params
            && self.pathname == other.pathname
            && self.pathname_base == other.pathname_base
    }
}

#[derive(Debug, Clone)]
struct BranchStep {
    route: Arc<RouteNode>,
    variant: PatternVariant,
}

/// A root-to-leaf route path with its specificity score.
#[derive(Debug, Clone)]
pub struct Branch {
    steps: Vec<BranchStep>,
    score: i32,
    order: Vec<(usize, usize)>,
}

impl Branch {
    pub fn score(&self) -> i32 {
        self.score
    }

    pub fn route_ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.route.id.as_str()).collect()
    }

    /// Concrete path this branch matches, e.g. `/users/:id`.
    pub fn path(&self) -> String {
        let segments: Vec<String> = self
            .steps
            .iter()
            .flat_map(|s| s.variant.segments.iter().map(ToString::to_string))
            .collect();
        format!("/{}", segments.join("/"))
    }

    fn try_match(&self, raw: &[&str]) -> Option<Vec<RouteMatch>> {
        let mut params = Params::new();
        let mut consumed = 0usize;
        let mut spans = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            let mut splat_start = None;
            for segment in &step.variant.segments {
                match segment {
                    Segment::Static(expected) | Segment::OptionalStatic(expected) => {
                        let actual = decode_segment(raw.get(consumed)?);
                        let equal = if step.route.case_sensitive {
                            actual == *expected
                        } else {
                            actual.to_lowercase() == expected.to_lowercase()
                        };
                        if !equal {
                            return None;
                        }
                        consumed += 1;
                    }
                    Segment::Dynamic(name) | Segment::OptionalDynamic(name) => {
                        let actual = raw.get(consumed)?;
                        params.insert(name.clone(), decode_segment(actual));
                        consumed += 1;
                    }
                    Segment::Splat => {
                        let rest: Vec<String> = raw[consumed..].iter().map(|s| decode_segment(s)).collect();
                        params.insert(SPLAT_PARAM.to_string(), rest.join("/"));
                        splat_start = Some(consumed);
                        consumed = raw.len();
                    }
                }
            }
            spans.push((splat_start.unwrap_or(consumed), consumed));
        }

        if consumed != raw.len() {
            return None;
        }

        let join = |n: usize| format!("/{}", raw[..n].join("/"));
        Some(
            self.steps
                .iter()
                .zip(spans)
                .map(|(step, (base_end, end))| RouteMatch {
                    route: step.route.clone(),
                    params: params.clone(),
                    pathname: join(end),
                    pathname_base: join(base_end),
                })
                .collect(),
        )
    }
}

/// The compiled route tree plus its ranked branches.
#[derive(Debug, Clone)]
pub struct RouteTree {
    roots: Vec<Arc<RouteNode>>,
    branches: Vec<Branch>,
}

impl RouteTree {
    pub fn new(roots: Vec<Arc<RouteNode>>) -> Self {
        let mut branches = Vec::new();
        flatten(&roots, &[], &[], &mut branches);
        branches.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.order.cmp(&b.order)));
        Self { roots, branches }
    }

    pub fn roots(&self) -> &[Arc<RouteNode>] {
        &self.roots
    }

    /// Branches in rank order.
    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    pub fn find(&self, id: &str) -> Option<Arc<RouteNode>> {
        fn walk(nodes: &[Arc<RouteNode>], id: &str) -> Option<Arc<RouteNode>> {
            nodes.iter().find_map(|n| {
                if n.id == id {
                    Some(n.clone())
                } else {
                    walk(&n.children, id)
                }
            })
        }
        walk(&self.roots, id)
    }

    /// Match `pathname` (which still carries `basename`).
    pub fn match_routes(&self, pathname: &str, basename: &str) -> Option<Vec<RouteMatch>> {
        let stripped = strip_basename(pathname, basename)?;
        let raw: Vec<&str> = stripped.split('/').filter(|s| !s.is_empty()).collect();
        self.branches.iter().find_map(|branch| branch.try_match(&raw))
    }
}

fn flatten(
    nodes: &[Arc<RouteNode>],
    prefix: &[BranchStep],
    order: &[(usize, usize)],
    out: &mut Vec<Branch>,
) {
    for (i, node) in nodes.iter().enumerate() {
        let variants = match node.pattern() {
            Some(pattern) => pattern.explode(),
            None => vec![PatternVariant::default()],
        };
        for (v, variant) in variants.into_iter().enumerate() {
            let mut steps = prefix.to_vec();
            steps.push(BranchStep {
                route: node.clone(),
                variant,
            });
            let mut here = order.to_vec();
            here.push((i, v));

            flatten(&node.children, &steps, &here, out);

            if matches!(node.kind, RouteKind::Layout) {
                continue;
            }
            let score = score_branch(steps.iter().map(|s| &s.variant), node.is_index());
            out.push(Branch {
                steps,
                score,
                order: here,
            });
        }
    }
}
