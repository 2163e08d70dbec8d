//! Method guard layer.

use axum::http::Method;
use futures_util::future::BoxFuture;

use crate::error::ApiError;
use crate::http::request::ApiRequest;
use crate::pipeline::context::Context;
use crate::pipeline::middleware::{Middleware, Next, PipelineResult};

/// Rejects methods outside the route's declared list before anything
/// further in runs.
pub(crate) struct MethodGuard {
    allowed: Vec<Method>,
}

impl MethodGuard {
    pub(crate) fn new(allowed: Vec<Method>) -> Self {
        Self { allowed }
    }
}

impl Middleware for MethodGuard {
    fn handle<'a>(
        &'a self,
        req: ApiRequest,
        ctx: Context,
        next: Next<'a>,
    ) -> BoxFuture<'a, PipelineResult> {
        if self.allowed.contains(req.method()) {
            return next.run(req, ctx);
        }
        let err = ApiError::MethodNotAllowed {
            method: req.method().clone(),
            allowed: self.allowed.clone(),
        };
        Box::pin(async move { Err(err) })
    }
}
