//! Request dispatcher.
//!
//! # Responsibilities
//! - Resolve the pathname (or a caller-supplied override) against the route table
//! - Enrich the request with the matched pathname and params
//! - Run the route's composed handler, or the not-found endpoint on a miss
//!
//! # Design Decisions
//! - Errors escaping a composed handler are returned, not caught; the
//!   exception handler middleware or the runtime boundary owns that
//! - Bodies are buffered once, up to a configured limit, before dispatch

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderValue, Request, StatusCode};
use futures_util::future::BoxFuture;
use tracing::debug;

use crate::error::{ApiError, SetupError};
use crate::http::request::ApiRequest;
use crate::http::response::Reply;
use crate::pipeline::{
    compose, serialize, ComposedHandler, Context, Endpoint, GlobalSpec, Next, PipelineResult,
    RouteSpec,
};
use crate::routing::{Params, RouteSource, RouteTable};

/// Default request body limit (2 MiB).
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// A route as declared by application code: its spec plus its handler.
#[derive(Clone)]
pub struct RouteModule {
    pub spec: RouteSpec,
    pub handler: Arc<dyn Endpoint>,
}

impl RouteModule {
    pub fn new(spec: RouteSpec, handler: Arc<dyn Endpoint>) -> Self {
        Self { spec, handler }
    }
}

/// Plain-text 404.
struct DefaultNotFound;

impl Endpoint for DefaultNotFound {
    fn call<'a>(&'a self, _req: ApiRequest, _ctx: Context) -> BoxFuture<'a, PipelineResult> {
        Box::pin(async {
            Ok(Reply::raw("Not Found")
                .with_status(StatusCode::NOT_FOUND)
                .with_header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8")))
        })
    }
}

/// Display form of the route pattern that served a request, e.g.
/// `/users/:id`. Attached to responses as an extension by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedPattern(pub String);

pub struct Dispatcher {
    table: RouteTable<ComposedHandler>,
    not_found: Arc<dyn Endpoint>,
    body_limit: usize,
}

impl Dispatcher {
    pub fn new(table: RouteTable<ComposedHandler>, not_found: Option<Arc<dyn Endpoint>>) -> Self {
        Self {
            table,
            not_found: not_found.unwrap_or_else(|| Arc::new(DefaultNotFound)),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    /// Compose every route module against `global` and build the table.
    pub fn from_modules(
        global: &GlobalSpec,
        source: RouteSource<RouteModule>,
    ) -> Result<Self, SetupError> {
        let source = source.try_map(|_file, module| compose(global, module.spec, module.handler))?;
        let table = RouteTable::build(source)?;
        Ok(Self::new(table, global.not_found().cloned()))
    }

    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    pub fn table(&self) -> &RouteTable<ComposedHandler> {
        &self.table
    }

    /// Dispatch one request.
    ///
    /// `pathname_override` replaces the URI path for matching, as used when
    /// this dispatcher is mounted under a prefix of another.
    pub async fn handle(&self, req: ApiRequest, pathname_override: Option<&str>) -> PipelineResult {
        self.dispatch(req, pathname_override).await.1
    }

    async fn dispatch(
        &self,
        req: ApiRequest,
        pathname_override: Option<&str>,
    ) -> (Option<MatchedPattern>, PipelineResult) {
        let pathname = pathname_override
            .map(str::to_string)
            .unwrap_or_else(|| req.uri().path().to_string());

        match self.table.find(&pathname) {
            Some(found) => {
                let pattern = found.pattern.to_string();
                debug!(
                    method = %req.method(),
                    path = %pathname,
                    pattern = %pattern,
                    "Route matched"
                );
                let handler = found.handler;
                let result = handler.call(req.with_route(pathname, found.params)).await;
                (Some(MatchedPattern(pattern)), result)
            }
            None => {
                debug!(method = %req.method(), path = %pathname, "No route matched");
                let req = req.with_route(pathname, Params::default());
                let result = Next::new(&[], self.not_found.as_ref())
                    .run(req, Context::new())
                    .await
                    .and_then(|reply| serialize(reply, None, false));
                (None, result)
            }
        }
    }

    /// Buffer an HTTP request body and dispatch it.
    pub async fn handle_http(&self, request: Request<Body>) -> PipelineResult {
        self.dispatch_http(request).await.1
    }

    /// Like [`Dispatcher::handle_http`], also reporting the matched pattern.
    pub async fn dispatch_http(&self, request: Request<Body>) -> (Option<MatchedPattern>, PipelineResult) {
        let (parts, body) = request.into_parts();
        match axum::body::to_bytes(body, self.body_limit).await {
            Ok(bytes) => self.dispatch(ApiRequest::from_parts(parts, bytes), None).await,
            Err(err) => (
                None,
                Err(ApiError::http(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    format!("request body rejected (limit {} bytes): {err}", self.body_limit),
                )),
            ),
        }
    }

    /// Endpoint that hands requests under `prefix` to this dispatcher with
    /// the prefix stripped.
    pub fn mount(self: Arc<Self>, prefix: impl Into<String>) -> Arc<dyn Endpoint> {
        Arc::new(Mounted {
            prefix: prefix.into().trim_end_matches('/').to_string(),
            inner: self,
        })
    }
}

struct Mounted {
    prefix: String,
    inner: Arc<Dispatcher>,
}

impl Endpoint for Mounted {
    fn call<'a>(&'a self, req: ApiRequest, _ctx: Context) -> BoxFuture<'a, PipelineResult> {
        Box::pin(async move {
            let rest = strip_mount_prefix(req.pathname(), &self.prefix);
            self.inner.handle(req, Some(&rest)).await
        })
    }
}

/// Strip `prefix` only at a segment boundary; other paths pass through.
fn strip_mount_prefix(pathname: &str, prefix: &str) -> String {
    match pathname.strip_prefix(prefix) {
        Some("") => "/".to_string(),
        Some(rest) if rest.starts_with('/') => rest.to_string(),
        _ => pathname.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Method;
    use bytes::Bytes;
    use serde_json::json;

    use super::*;
    use crate::http::response::ReplyBody;
    use crate::pipeline::handler_fn;

    fn echo_params() -> RouteModule {
        RouteModule::new(
            RouteSpec::new([Method::GET]),
            handler_fn(|req: ApiRequest, _ctx| async move {
                Ok(Reply::json(json!({
                    "pathname": req.pathname(),
                    "params": req.params().to_json(),
                })))
            }),
        )
    }

    fn body(reply: Reply) -> serde_json::Value {
        match reply.body {
            Some(ReplyBody::Raw(bytes)) => serde_json::from_slice(&bytes).unwrap(),
            other => panic!("unexpected body: {other:?}"),
        }
    }

    fn get(path: &str) -> ApiRequest {
        ApiRequest::new(Method::GET, path.parse().unwrap())
    }

    #[tokio::test]
    async fn test_match_enriches_request() {
        let source = RouteSource::new()
            .route("users/[id].ts", echo_params())
            .route("users/me.ts", echo_params());
        let dispatcher = Dispatcher::from_modules(&GlobalSpec::default(), source).unwrap();

        let reply = dispatcher.handle(get("/users/42"), None).await.unwrap();
        assert_eq!(body(reply), json!({"pathname": "/users/42", "params": {"id": "42"}}));

        let reply = dispatcher.handle(get("/users/me"), None).await.unwrap();
        assert_eq!(body(reply)["params"], json!({}));
    }

    #[tokio::test]
    async fn test_miss_uses_default_not_found() {
        let dispatcher = Dispatcher::from_modules(&GlobalSpec::default(), RouteSource::new()).unwrap();
        let reply = dispatcher.handle(get("/nowhere"), None).await.unwrap();
        assert_eq!(reply.status, Some(StatusCode::NOT_FOUND));
        assert_eq!(reply.body, Some(ReplyBody::Raw(Bytes::from("Not Found"))));
    }

    #[tokio::test]
    async fn test_custom_not_found_sees_pathname() {
        let global = GlobalSpec::builder()
            .not_found(handler_fn(|req: ApiRequest, _ctx| async move {
                Ok(Reply::json(json!({ "missing": req.pathname() })).with_status(StatusCode::NOT_FOUND))
            }))
            .build();
        let dispatcher = Dispatcher::from_modules(&global, RouteSource::new()).unwrap();
        let reply = dispatcher.handle(get("/a/b/"), None).await.unwrap();
        assert_eq!(reply.status, Some(StatusCode::NOT_FOUND));
        assert_eq!(body(reply), json!({"missing": "/a/b/"}));
    }

    #[tokio::test]
    async fn test_errors_are_not_caught() {
        let source = RouteSource::new().route(
            "boom.ts",
            RouteModule::new(
                RouteSpec::new([Method::GET]),
                handler_fn(|_req, _ctx| async { Err(ApiError::internal("boom")) }),
            ),
        );
        let dispatcher = Dispatcher::from_modules(&GlobalSpec::default(), source).unwrap();
        let err = dispatcher.handle(get("/boom"), None).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_mounted_dispatcher_strips_prefix() {
        let inner = Arc::new(
            Dispatcher::from_modules(
                &GlobalSpec::default(),
                RouteSource::new().route("items/[id].ts", echo_params()),
            )
            .unwrap(),
        );
        let outer = Dispatcher::from_modules(
            &GlobalSpec::default(),
            RouteSource::new().route(
                "api/[[...rest]].ts",
                RouteModule::new(RouteSpec::new([Method::GET]), inner.mount("/api")),
            ),
        )
        .unwrap();

        let reply = outer.handle(get("/api/items/7"), None).await.unwrap();
        assert_eq!(body(reply), json!({"pathname": "/items/7", "params": {"id": "7"}}));
    }

    #[test]
    fn test_mount_prefix_respects_segments() {
        assert_eq!(strip_mount_prefix("/api/items/7", "/api"), "/items/7");
        assert_eq!(strip_mount_prefix("/api", "/api"), "/");
        assert_eq!(strip_mount_prefix("/apiary", "/api"), "/apiary");
        assert_eq!(strip_mount_prefix("/other", "/api"), "/other");
    }

    #[tokio::test]
    async fn test_dispatch_http_reports_pattern() {
        let dispatcher = Dispatcher::from_modules(
            &GlobalSpec::default(),
            RouteSource::new().route("users/[id].ts", echo_params()),
        )
        .unwrap();

        let request = Request::builder().uri("/users/9").body(Body::empty()).unwrap();
        let (pattern, result) = dispatcher.dispatch_http(request).await;
        assert_eq!(pattern, Some(MatchedPattern("/users/:id".to_string())));
        assert!(result.is_ok());

        let request = Request::builder().uri("/nope").body(Body::empty()).unwrap();
        let (pattern, _) = dispatcher.dispatch_http(request).await;
        assert_eq!(pattern, None);
    }

    #[tokio::test]
    async fn test_handle_http_enforces_body_limit() {
        let dispatcher = Dispatcher::from_modules(
            &GlobalSpec::default(),
            RouteSource::new().route("upload.ts", echo_params()),
        )
        .unwrap()
        .with_body_limit(4);
        let request = Request::builder()
            .method(Method::GET)
            .uri("/upload")
            .body(Body::from("far too long"))
            .unwrap();
        let err = dispatcher.handle_http(request).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
