//! Middleware composition engine.
//!
//! # Data Flow
//! ```text
//! GlobalSpec + RouteSpec + handler
//!     → compose()
//!     → ComposedHandler { layers, endpoint }
//!     → call(req): Next cursor walks the layers, then the endpoint
//! ```

pub mod auth;
pub mod compose;
pub mod context;
pub mod exception;
pub mod guard;
pub mod input;
pub mod middleware;
pub mod serialize;

pub use compose::{
    compose, AuthFailureHook, AuthSelector, ComposeError, ComposedHandler, GlobalSpec,
    GlobalSpecBuilder, InputSchemas, OutputSchemas, RouteSpec,
};
pub use context::{Context, Identity, ValidatedInput};
pub use exception::ExceptionHandler;
pub use input::validate_input;
pub use middleware::{handler_fn, middleware_fn, Endpoint, Middleware, Next, PipelineResult};
pub use serialize::serialize;
