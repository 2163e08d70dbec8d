//! Minimal fetch-style runtime.
//!
//! Wraps a [`Dispatcher`] as a `Request -> Response` function and adds the
//! one thing the dispatcher deliberately does not do: any error that
//! escapes the pipeline becomes a well-formed response.

use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use futures_util::future::BoxFuture;
use tower::Service;
use tracing::{debug, error};

use crate::dispatcher::{Dispatcher, MatchedPattern};

#[derive(Clone)]
pub struct FetchRuntime {
    dispatcher: Arc<Dispatcher>,
}

impl FetchRuntime {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Serve one request. Never fails. A matched route's pattern is attached
    /// as a [`MatchedPattern`] response extension.
    pub async fn fetch(&self, request: Request<Body>) -> Response {
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let (pattern, result) = self.dispatcher.dispatch_http(request).await;
        let mut response = match result {
            Ok(reply) => reply.into_response(),
            Err(err) => {
                if err.is_client_error() {
                    debug!(%method, %path, error = %err, "Unhandled client error");
                } else {
                    error!(%method, %path, error = %err, "Unhandled error reached the runtime");
                }
                err.to_reply().into_response()
            }
        };
        if let Some(pattern) = pattern {
            response.extensions_mut().insert(pattern);
        }
        response
    }
}

impl Service<Request<Body>> for FetchRuntime {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let runtime = self.clone();
        Box::pin(async move { Ok(runtime.fetch(request).await) })
    }
}
