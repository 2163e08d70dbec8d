//! Route patterns derived from file paths.
//!
//! # Conventions
//! - `[id]` → required single-segment parameter
//! - `[[id]]` → optional single-segment parameter
//! - `[...rest]` → required catch-all (one or more segments)
//! - `[[...rest]]` → optional catch-all (zero or more segments)
//! - anything else → literal
//!
//! A trailing `index` contributes two patterns: one keeping `index` as a
//! literal and one with it elided, so `a/index.rs` answers `/a/index` and `/a`.

use std::fmt;

use super::RouteError;

/// One segment of a route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param(String),
    OptionalParam(String),
    CatchAll(String),
    OptionalCatchAll(String),
}

impl Segment {
    /// Parameter name, `None` for literals.
    pub fn name(&self) -> Option<&str> {
        match self {
            Segment::Literal(_) => None,
            Segment::Param(n)
            | Segment::OptionalParam(n)
            | Segment::CatchAll(n)
            | Segment::OptionalCatchAll(n) => Some(n),
        }
    }

    pub fn is_param(&self) -> bool {
        !matches!(self, Segment::Literal(_))
    }

    /// Same kind (and same text for literals); parameter names are ignored.
    fn same_shape(&self, other: &Segment) -> bool {
        match (self, other) {
            (Segment::Literal(a), Segment::Literal(b)) => a == b,
            (Segment::Param(_), Segment::Param(_))
            | (Segment::OptionalParam(_), Segment::OptionalParam(_))
            | (Segment::CatchAll(_), Segment::CatchAll(_))
            | (Segment::OptionalCatchAll(_), Segment::OptionalCatchAll(_)) => true,
            _ => false,
        }
    }

    fn parse(raw: &str, file: &str) -> Result<Self, RouteError> {
        let malformed = || RouteError::MalformedSegment {
            file: file.to_string(),
            segment: raw.to_string(),
        };

        if let Some(inner) = raw.strip_prefix("[[").and_then(|s| s.strip_suffix("]]")) {
            return match inner.strip_prefix("...") {
                Some(name) => Ok(Segment::OptionalCatchAll(param_name(name).ok_or_else(malformed)?)),
                None => Ok(Segment::OptionalParam(param_name(inner).ok_or_else(malformed)?)),
            };
        }
        if let Some(inner) = raw.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            return match inner.strip_prefix("...") {
                Some(name) => Ok(Segment::CatchAll(param_name(name).ok_or_else(malformed)?)),
                None => Ok(Segment::Param(param_name(inner).ok_or_else(malformed)?)),
            };
        }
        if raw.contains(['[', ']']) {
            return Err(malformed());
        }
        Ok(Segment::Literal(raw.to_string()))
    }
}

fn param_name(raw: &str) -> Option<String> {
    let valid = !raw.is_empty() && !raw.contains(['[', ']', '.', '/']);
    valid.then(|| raw.to_string())
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Literal(s) => write!(f, "{s}"),
            Segment::Param(n) => write!(f, ":{n}"),
            Segment::OptionalParam(n) => write!(f, ":{n}?"),
            Segment::CatchAll(n) => write!(f, "*{n}"),
            Segment::OptionalCatchAll(n) => write!(f, "*{n}?"),
        }
    }
}

/// Parsed path template. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    segments: Vec<Segment>,
}

impl RoutePattern {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// Derive the pattern(s) for a route source file.
    ///
    /// Returns two patterns for `index` files, one otherwise.
    pub fn from_file_path(file: &str) -> Result<Vec<Self>, RouteError> {
        let normalized = file.replace('\\', "/");
        let mut raw: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();

        let Some(last) = raw.pop() else {
            return Err(RouteError::EmptyPath);
        };
        let last = strip_extension(last);
        if last.is_empty() {
            return Err(RouteError::EmptyPath);
        }
        raw.push(last);

        let segments = raw
            .iter()
            .map(|s| Segment::parse(s, file))
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen: Vec<&str> = Vec::new();
        for name in segments.iter().filter_map(Segment::name) {
            if seen.contains(&name) {
                return Err(RouteError::DuplicateParam {
                    file: file.to_string(),
                    name: name.to_string(),
                });
            }
            seen.push(name);
        }

        let full = RoutePattern::new(segments);
        if matches!(full.segments.last(), Some(Segment::Literal(s)) if s == "index") {
            let mut elided = full.segments.clone();
            elided.pop();
            return Ok(vec![full, RoutePattern::new(elided)]);
        }
        Ok(vec![full])
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Specificity key: fewer parameters sort first.
    pub fn param_count(&self) -> usize {
        self.segments.iter().filter(|s| s.is_param()).count()
    }

    /// Structural identity, ignoring parameter names.
    pub fn is_same_shape(&self, other: &RoutePattern) -> bool {
        self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|(a, b)| a.same_shape(b))
    }
}

/// Drop a file extension, leaving dots inside brackets (`[...rest]`) alone.
fn strip_extension(segment: &str) -> &str {
    let Some(dot) = segment.rfind('.') else {
        return segment;
    };
    let after_brackets = segment.rfind(']').map_or(true, |close| dot > close);
    if dot > 0 && after_brackets {
        &segment[..dot]
    } else {
        segment
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}
