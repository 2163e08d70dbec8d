//! HTTP request/response model and the native host.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum, request ID, timeout, trace)
//!     → runtime (buffer body, catch-all)
//!     → request.rs (ApiRequest + response defaults)
//!     → dispatcher → composed pipeline
//!     → response.rs (Reply merge, encode, into axum Response)
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{ApiRequest, ResponseDefaults, X_REQUEST_ID};
pub use response::{Blob, FormValue, Payload, Reply, ReplyBody};
pub use server::{DevCoordinator, HandlerSource, HttpServer};
