//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Compilation (per route-source snapshot):
//!     RouteSource [(file path, handler)]
//!     → pattern.rs (file path → RoutePattern, `index` registered twice)
//!     → router.rs (reject duplicate shapes, sort by specificity)
//!     → Freeze as immutable RouteTable
//!
//! Incoming Request (pathname)
//!     → router.rs (ordered scan)
//!     → matcher.rs (segment walk + percent-decoding)
//!     → Return: RouteMatch { pattern, handler, params } or None
//! ```
//!
//! # Design Decisions
//! - Deterministic: same table and path always yield the same match
//! - No regex in the hot path
//! - Fewest-params-first ordering makes literal routes win over dynamic ones

pub mod matcher;
pub mod pattern;
pub mod router;

use thiserror::Error;

pub use matcher::{DecodeError, ParamValue, Params};
pub use pattern::{RoutePattern, Segment};
pub use router::{RouteMatch, RouteSource, RouteTable};

/// Errors raised while building a route table.
#[derive(Debug, Clone, Error)]
pub enum RouteError {
    #[error("route file path is empty")]
    EmptyPath,

    #[error("malformed segment `{segment}` in route file `{file}`")]
    MalformedSegment { file: String, segment: String },

    #[error("parameter `{name}` appears twice in route file `{file}`")]
    DuplicateParam { file: String, name: String },

    #[error("pattern {pattern} is declared by both `{first}` and `{second}`")]
    DuplicatePattern {
        pattern: String,
        first: String,
        second: String,
    },
}
