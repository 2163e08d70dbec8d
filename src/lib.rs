//! File-routed API server library.
//!
//! Route files such as `users/[id].ts` become URL patterns; each route is a
//! composed pipeline of middleware around a handler; a dispatcher picks the
//! route for each request; a thin runtime turns that into an HTTP service.
//! In dev mode the route set is reloaded from a watched build artifact.

// Routing and dispatch
pub mod dispatcher;
pub mod routing;
pub mod runtime;

// Request pipeline
pub mod error;
pub mod pipeline;
pub mod schema;

// Hosting
pub mod dev;
pub mod http;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub mod app;

pub use config::ServerConfig;
pub use dispatcher::{Dispatcher, RouteModule};
pub use error::{ApiError, SetupError};
pub use http::{ApiRequest, HandlerSource, HttpServer, Reply};
pub use lifecycle::Shutdown;
pub use pipeline::{compose, GlobalSpec, RouteSpec};
pub use runtime::FetchRuntime;
