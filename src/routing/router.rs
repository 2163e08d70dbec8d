//! Route table: build and lookup.
//!
//! # Responsibilities
//! - Derive patterns for every route source entry
//! - Reject structurally identical patterns
//! - Order by specificity (fewest params first, declaration order on ties)
//! - Look up the first matching pattern for a pathname
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Rebuilt wholesale when the route source changes
//! - First match wins, so ordering is part of correctness

use tracing::{debug, info};

use super::matcher::{match_path, Params};
use super::pattern::RoutePattern;
use super::RouteError;

/// Ordered `(file path, handler)` declarations a table is built from.
#[derive(Debug, Clone)]
pub struct RouteSource<H> {
    entries: Vec<(String, H)>,
}

impl<H> Default for RouteSource<H> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<H> RouteSource<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, file: impl Into<String>, handler: H) -> Self {
        self.entries.push((file.into(), handler));
        self
    }

    pub fn push(&mut self, file: impl Into<String>, handler: H) {
        self.entries.push((file.into(), handler));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Transform every handler, keeping declaration order.
    pub fn try_map<T, E>(self, mut f: impl FnMut(&str, H) -> Result<T, E>) -> Result<RouteSource<T>, E> {
        let entries = self
            .entries
            .into_iter()
            .map(|(file, handler)| {
                let mapped = f(&file, handler)?;
                Ok((file, mapped))
            })
            .collect::<Result<Vec<_>, E>>()?;
        Ok(RouteSource { entries })
    }
}

impl<H, S: Into<String>> FromIterator<(S, H)> for RouteSource<H> {
    fn from_iter<I: IntoIterator<Item = (S, H)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(f, h)| (f.into(), h)).collect(),
        }
    }
}

#[derive(Debug, Clone)]
struct RouteEntry<H> {
    pattern: RoutePattern,
    file: String,
    handler: H,
}

/// Result of a successful lookup.
#[derive(Debug)]
pub struct RouteMatch<'t, H> {
    pub pattern: &'t RoutePattern,
    pub file: &'t str,
    pub handler: &'t H,
    pub params: Params,
}

/// Pattern → handler table ordered by specificity.
#[derive(Debug, Clone)]
pub struct RouteTable<H> {
    routes: Vec<RouteEntry<H>>,
}

impl<H: Clone> RouteTable<H> {
    /// Build a table from a route source snapshot.
    pub fn build(source: RouteSource<H>) -> Result<Self, RouteError> {
        let mut routes: Vec<RouteEntry<H>> = Vec::with_capacity(source.len());

        for (file, handler) in source.entries {
            for pattern in RoutePattern::from_file_path(&file)? {
                if let Some(existing) = routes.iter().find(|r| r.pattern.is_same_shape(&pattern)) {
                    return Err(RouteError::DuplicatePattern {
                        pattern: pattern.to_string(),
                        first: existing.file.clone(),
                        second: file,
                    });
                }
                routes.push(RouteEntry {
                    pattern,
                    file: file.clone(),
                    handler: handler.clone(),
                });
            }
        }

        // Stable: declaration order survives among equal param counts.
        routes.sort_by_key(|r| r.pattern.param_count());

        info!(routes = routes.len(), "Route table built");
        Ok(Self { routes })
    }
}

impl<H> RouteTable<H> {
    /// Find the most specific pattern matching `path`.
    pub fn find(&self, path: &str) -> Option<RouteMatch<'_, H>> {
        for route in &self.routes {
            match match_path(route.pattern.segments(), path) {
                Ok(Some(params)) => {
                    return Some(RouteMatch {
                        pattern: &route.pattern,
                        file: &route.file,
                        handler: &route.handler,
                        params,
                    })
                }
                Ok(None) => {}
                // Less specific patterns are not tried.
                Err(err) => {
                    debug!(path, pattern = %route.pattern, error = %err, "Path does not decode");
                    return None;
                }
            }
        }
        None
    }

    /// Patterns in match order.
    pub fn patterns(&self) -> impl Iterator<Item = &RoutePattern> {
        self.routes.iter().map(|r| &r.pattern)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
