//! Segment-wise path matching.
//!
//! # Responsibilities
//! - Normalize the request pathname (strip trailing slash except root)
//! - Walk a pattern against the path segments with backtracking
//! - Percent-decode captured segments
//!
//! # Design Decisions
//! - Literals compare against the raw segment, case-sensitive
//! - Required params never capture an empty segment
//! - Catch-alls are greedy; backtracking lets literals follow them
//! - A capture that fails to decode ends the lookup for the request
//! - No regex: matching is a pure walk over the segment list

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use super::pattern::Segment;

/// A captured parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    One(String),
    Many(Vec<String>),
}

impl ParamValue {
    /// Single value, or `None` for repeating captures.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::One(s) => Some(s),
            ParamValue::Many(_) => None,
        }
    }

    /// Repeating captures, or `None` for single values.
    pub fn as_slice(&self) -> Option<&[String]> {
        match self {
            ParamValue::One(_) => None,
            ParamValue::Many(v) => Some(v),
        }
    }
}

/// Parameters extracted by a successful match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(BTreeMap<String, ParamValue>);

impl Params {
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        self.0.insert(name.into(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// JSON object view, the shape handed to route-param schemas.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| {
                    let value = match v {
                        ParamValue::One(s) => Value::String(s.clone()),
                        ParamValue::Many(items) => {
                            Value::Array(items.iter().cloned().map(Value::String).collect())
                        }
                    };
                    (k.clone(), value)
                })
                .collect(),
        )
    }
}

/// Strip a trailing slash unless the path is the root.
pub fn normalize(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else if path.is_empty() {
        "/"
    } else {
        path
    }
}

fn split(path: &str) -> Vec<&str> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('/').collect()
    }
}

enum Capture<'p> {
    One(&'p str),
    Many(&'p [&'p str]),
}

/// A captured segment that is not valid percent-encoded UTF-8.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("path segment `{0}` does not decode")]
pub struct DecodeError(pub String);

/// Match `path` against `pattern`.
///
/// `Ok(None)` means the shape does not fit. An `Err` means it fits but a
/// capture does not decode, which ends the lookup for the whole request.
pub fn match_path(pattern: &[Segment], path: &str) -> Result<Option<Params>, DecodeError> {
    let raw = split(normalize(path));
    let mut captures = Vec::new();
    if !walk(pattern, &raw, &mut captures) {
        return Ok(None);
    }

    let mut params = Params::default();
    for (name, capture) in captures {
        let value = match capture {
            Capture::One(s) => ParamValue::One(decode(s)?),
            Capture::Many(items) => ParamValue::Many(
                items.iter().map(|s| decode(s)).collect::<Result<Vec<_>, _>>()?,
            ),
        };
        params.insert(name, value);
    }
    Ok(Some(params))
}

fn decode(raw: &str) -> Result<String, DecodeError> {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .map_err(|_| DecodeError(raw.to_string()))
}

fn walk<'s, 'p>(
    pattern: &'s [Segment],
    path: &'p [&'p str],
    captures: &mut Vec<(&'s str, Capture<'p>)>,
) -> bool {
    let Some((head, rest)) = pattern.split_first() else {
        return path.is_empty();
    };

    match head {
        Segment::Literal(literal) => match path.split_first() {
            Some((segment, tail)) if *segment == literal.as_str() => walk(rest, tail, captures),
            _ => false,
        },
        Segment::Param(name) => take_one(name, rest, path, captures),
        Segment::OptionalParam(name) => {
            take_one(name, rest, path, captures) || walk(rest, path, captures)
        }
        Segment::CatchAll(name) => take_many(name, 1, rest, path, captures),
        Segment::OptionalCatchAll(name) => take_many(name, 0, rest, path, captures),
    }
}

fn take_one<'s, 'p>(
    name: &'s str,
    rest: &'s [Segment],
    path: &'p [&'p str],
    captures: &mut Vec<(&'s str, Capture<'p>)>,
) -> bool {
    match path.split_first() {
        Some((segment, tail)) if !segment.is_empty() => {
            captures.push((name, Capture::One(segment)));
            if walk(rest, tail, captures) {
                return true;
            }
            captures.pop();
            false
        }
        _ => false,
    }
}

fn take_many<'s, 'p>(
    name: &'s str,
    min: usize,
    rest: &'s [Segment],
    path: &'p [&'p str],
    captures: &mut Vec<(&'s str, Capture<'p>)>,
) -> bool {
    let available = path.iter().take_while(|s| !s.is_empty()).count();
    if available < min {
        return false;
    }
    for take in (min..=available).rev() {
        let mark = captures.len();
        if take > 0 {
            captures.push((name, Capture::Many(&path[..take])));
        }
        if walk(rest, &path[take..], captures) {
            return true;
        }
        captures.truncate(mark);
    }
    false
}
