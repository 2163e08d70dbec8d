//! Request-time error taxonomy.
//!
//! # Classes
//! - Routing: no pattern matched (handled by the dispatcher's not-found path)
//! - Method: method outside the route's allow-list (client error, carries the list)
//! - Input: malformed body, wrong content type, schema failure (client error)
//! - Auth: one or more auth middlewares rejected the request (client error)
//! - Output: handler reply violates its declared schema (server error)
//! - Unhandled: anything else raised by application code (server error)
//!
//! # Design Decisions
//! - Errors are values; nothing here panics or logs
//! - Every error can render itself as a JSON reply so an exception-handling
//!   layer (or the runtime catch-all) never has to guess a status code

use std::fmt;

use axum::http::{header, HeaderValue, Method, StatusCode};
use serde_json::{json, Value};
use thiserror::Error;

use crate::http::response::Reply;
use crate::routing::RouteError;

/// Which part of the request an input error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputLocation {
    Params,
    Query,
    Json,
    Form,
    UrlEncoded,
}

impl fmt::Display for InputLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InputLocation::Params => "route params",
            InputLocation::Query => "query",
            InputLocation::Json => "json body",
            InputLocation::Form => "form data",
            InputLocation::UrlEncoded => "url-encoded body",
        };
        f.write_str(name)
    }
}

/// Errors raised while a request travels through the pipeline.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("no route matches {path}")]
    NotFound { path: String },

    #[error("method {method} is not allowed")]
    MethodNotAllowed { method: Method, allowed: Vec<Method> },

    #[error("invalid {location}: {detail}")]
    Input {
        location: InputLocation,
        detail: String,
        issues: Vec<String>,
    },

    #[error("unsupported media type, expected {expected}")]
    UnsupportedMediaType {
        expected: &'static str,
        found: Option<String>,
    },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("response failed validation: {detail}")]
    OutputValidation { detail: String, issues: Vec<String> },

    #[error("{message}")]
    Http { status: StatusCode, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Application-raised error with an explicit status.
    pub fn http(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError::Http {
            status,
            message: message.into(),
        }
    }

    pub fn internal(err: impl fmt::Display) -> Self {
        ApiError::Internal(err.to_string())
    }

    pub fn input(location: InputLocation, detail: impl Into<String>) -> Self {
        ApiError::Input {
            location,
            detail: detail.into(),
            issues: Vec::new(),
        }
    }

    /// HTTP status this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Input { .. } => StatusCode::BAD_REQUEST,
            ApiError::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::OutputValidation { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Http { status, .. } => *status,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }

    /// JSON error reply: `{"error": {"status", "message", "details"?}}`.
    ///
    /// Server-class errors other than application-raised ones hide their
    /// message behind the canonical reason phrase.
    pub fn to_reply(&self) -> Reply {
        let status = self.status();
        let message = match self {
            ApiError::Internal(_) | ApiError::OutputValidation { .. } => status
                .canonical_reason()
                .unwrap_or("Internal Server Error")
                .to_string(),
            other => other.to_string(),
        };

        let mut error = json!({
            "status": status.as_u16(),
            "message": message,
        });
        if let ApiError::Input { issues, location, .. } = self {
            error["location"] = Value::String(location.to_string());
            if !issues.is_empty() {
                error["details"] = json!(issues);
            }
        }

        let mut reply = Reply::json(json!({ "error": error })).with_status(status);
        if let ApiError::MethodNotAllowed { allowed, .. } = self {
            let allow = allowed
                .iter()
                .map(Method::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            if let Ok(value) = HeaderValue::from_str(&allow) {
                reply.headers.insert(header::ALLOW, value);
            }
        }
        reply
    }
}

/// Errors raised while turning route modules into a dispatcher.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Compose(#[from] crate::pipeline::ComposeError),
}
