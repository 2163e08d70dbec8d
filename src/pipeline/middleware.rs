//! Middleware capability and the continuation interpreter.
//!
//! A composed handler is an ordered slice of layers plus an endpoint.
//! [`Next`] is a cursor into that slice: `run` invokes the layer under the
//! cursor with a cursor advanced by one, and the endpoint once the slice is
//! exhausted. No closures are nested at composition time.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::error::ApiError;
use crate::http::request::ApiRequest;
use crate::http::response::Reply;
use crate::pipeline::context::Context;

/// Outcome of any pipeline stage.
pub type PipelineResult = Result<Reply, ApiError>;

/// One layer of the pipeline.
///
/// Layers are shared across requests and must only touch the request and
/// context they are handed. Call `next.run(req, ctx)` to continue, or return
/// (or fail) to short-circuit.
pub trait Middleware: Send + Sync {
    fn handle<'a>(
        &'a self,
        req: ApiRequest,
        ctx: Context,
        next: Next<'a>,
    ) -> BoxFuture<'a, PipelineResult>;
}

/// Innermost stage: route handler, not-found handler, delegated dispatcher.
pub trait Endpoint: Send + Sync {
    fn call<'a>(&'a self, req: ApiRequest, ctx: Context) -> BoxFuture<'a, PipelineResult>;
}

/// Cursor over the remaining layers.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    layers: &'a [Arc<dyn Middleware>],
    endpoint: &'a dyn Endpoint,
    reached: Option<&'a AtomicBool>,
}

impl<'a> Next<'a> {
    pub(crate) fn new(layers: &'a [Arc<dyn Middleware>], endpoint: &'a dyn Endpoint) -> Self {
        Self {
            layers,
            endpoint,
            reached: None,
        }
    }

    /// Same cursor, but `run` raises `flag` before anything downstream starts.
    pub(crate) fn guarded<'b>(self, flag: &'b AtomicBool) -> Next<'b>
    where
        'a: 'b,
    {
        Next {
            layers: self.layers,
            endpoint: self.endpoint,
            reached: Some(flag),
        }
    }

    /// Continue with the next layer (or the endpoint).
    ///
    /// The reply coming back is merged over the request's response defaults,
    /// so defaults set by layers that already ran survive a short-circuit
    /// further in.
    pub fn run(self, req: ApiRequest, ctx: Context) -> BoxFuture<'a, PipelineResult> {
        if let Some(flag) = self.reached {
            flag.store(true, Ordering::SeqCst);
        }

        let defaults = req.response_defaults().clone();
        let downstream = match self.layers.split_first() {
            Some((layer, rest)) => layer.handle(
                req,
                ctx,
                Next {
                    layers: rest,
                    endpoint: self.endpoint,
                    reached: None,
                },
            ),
            None => self.endpoint.call(req, ctx),
        };

        Box::pin(async move {
            let reply = downstream.await?;
            Ok(defaults.merge_under(reply))
        })
    }

    /// Layers left before the endpoint.
    pub fn remaining(&self) -> usize {
        self.layers.len()
    }
}

struct MiddlewareFn<F>(F);

impl<F> Middleware for MiddlewareFn<F>
where
    F: for<'a> Fn(ApiRequest, Context, Next<'a>) -> BoxFuture<'a, PipelineResult> + Send + Sync,
{
    fn handle<'a>(
        &'a self,
        req: ApiRequest,
        ctx: Context,
        next: Next<'a>,
    ) -> BoxFuture<'a, PipelineResult> {
        (self.0)(req, ctx, next)
    }
}

/// Adapt a closure into a middleware.
///
/// ```rust,ignore
/// let mw = middleware_fn(|req, ctx, next| Box::pin(async move {
///     req.response_defaults().set_header(name, value);
///     next.run(req, ctx).await
/// }));
/// ```
pub fn middleware_fn<F>(f: F) -> Arc<dyn Middleware>
where
    F: for<'a> Fn(ApiRequest, Context, Next<'a>) -> BoxFuture<'a, PipelineResult>
        + Send
        + Sync
        + 'static,
{
    Arc::new(MiddlewareFn(f))
}

struct HandlerFn<F>(F);

impl<F, Fut> Endpoint for HandlerFn<F>
where
    F: Fn(ApiRequest, Context) -> Fut + Send + Sync,
    Fut: Future<Output = PipelineResult> + Send + 'static,
{
    fn call<'a>(&'a self, req: ApiRequest, ctx: Context) -> BoxFuture<'a, PipelineResult> {
        Box::pin((self.0)(req, ctx))
    }
}

/// Adapt an async function into a route handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn Endpoint>
where
    F: Fn(ApiRequest, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = PipelineResult> + Send + 'static,
{
    Arc::new(HandlerFn(f))
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderName, HeaderValue, Method, StatusCode};

    use super::*;

    fn get() -> ApiRequest {
        ApiRequest::new(Method::GET, "/".parse().unwrap())
    }

    #[tokio::test]
    async fn test_reply_is_merged_over_defaults() {
        let endpoint = handler_fn(|_req, _ctx| async {
            Ok(Reply::raw("body").with_header(
                HeaderName::from_static("x-b"),
                HeaderValue::from_static("endpoint"),
            ))
        });
        let req = get();
        req.response_defaults()
            .set_header(HeaderName::from_static("x-a"), HeaderValue::from_static("default"));
        req.response_defaults()
            .set_header(HeaderName::from_static("x-b"), HeaderValue::from_static("default"));
        req.response_defaults().set_status(StatusCode::ACCEPTED);

        let reply = Next::new(&[], endpoint.as_ref())
            .run(req, Context::new())
            .await
            .unwrap();
        assert_eq!(reply.status, Some(StatusCode::ACCEPTED));
        assert_eq!(reply.headers["x-a"], "default");
        assert_eq!(reply.headers["x-b"], "endpoint");
    }

    #[tokio::test]
    async fn test_cursor_advances_one_layer_at_a_time() {
        let counts: Arc<std::sync::Mutex<Vec<usize>>> = Arc::default();
        let layer = |counts: Arc<std::sync::Mutex<Vec<usize>>>| {
            middleware_fn(move |req, ctx, next| {
                counts.lock().unwrap().push(next.remaining());
                next.run(req, ctx)
            })
        };
        let layers = vec![layer(Arc::clone(&counts)), layer(Arc::clone(&counts)), layer(Arc::clone(&counts))];
        let endpoint = handler_fn(|_req, _ctx| async { Ok(Reply::raw("done")) });

        let next = Next::new(&layers, endpoint.as_ref());
        assert_eq!(next.remaining(), 3);
        next.run(get(), Context::new()).await.unwrap();
        assert_eq!(*counts.lock().unwrap(), vec![2, 1, 0]);
    }

    #[tokio::test]
    async fn test_guarded_flag_is_raised_on_run() {
        let endpoint = handler_fn(|_req, _ctx| async { Err(ApiError::Forbidden("nope".into())) });
        let flag = AtomicBool::new(false);
        let next = Next::new(&[], endpoint.as_ref()).guarded(&flag);
        assert!(!flag.load(Ordering::SeqCst));

        let result = next.run(get(), Context::new()).await;
        assert!(result.is_err());
        assert!(flag.load(Ordering::SeqCst));
    }
}
