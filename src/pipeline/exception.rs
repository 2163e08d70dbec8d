//! Built-in exception handling middleware.

use futures_util::future::BoxFuture;
use tracing::{debug, error};

use crate::http::request::ApiRequest;
use crate::pipeline::context::Context;
use crate::pipeline::middleware::{Middleware, Next, PipelineResult};

/// Turns any error raised further in into its JSON error reply.
///
/// Register it with `GlobalSpec::builder().exception_handler(...)` so it
/// sits right inside the outer serialization layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExceptionHandler;

impl Middleware for ExceptionHandler {
    fn handle<'a>(
        &'a self,
        req: ApiRequest,
        ctx: Context,
        next: Next<'a>,
    ) -> BoxFuture<'a, PipelineResult> {
        let method = req.method().clone();
        let path = req.pathname().to_string();
        let request_id = req.request_id().map(str::to_string);

        Box::pin(async move {
            match next.run(req, ctx).await {
                Ok(reply) => Ok(reply),
                Err(err) => {
                    let status = err.status().as_u16();
                    if err.is_client_error() {
                        debug!(%method, %path, status, error = %err, "Request rejected");
                    } else {
                        error!(
                            %method,
                            %path,
                            status,
                            request_id = request_id.as_deref().unwrap_or("-"),
                            error = %err,
                            "Request failed"
                        );
                    }
                    Ok(err.to_reply())
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::{header, Method, StatusCode};

    use super::*;
    use crate::error::{ApiError, InputLocation};
    use crate::http::response::ReplyBody;
    use crate::pipeline::compose::{compose, GlobalSpec, RouteSpec};
    use crate::pipeline::middleware::handler_fn;

    fn body_json(reply: &crate::http::response::Reply) -> serde_json::Value {
        match &reply.body {
            Some(ReplyBody::Raw(bytes)) => serde_json::from_slice(bytes).unwrap(),
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_errors_become_replies() {
        let global = GlobalSpec::builder()
            .exception_handler(Arc::new(ExceptionHandler))
            .build();
        let handler = handler_fn(|_req, _ctx| async {
            Err(ApiError::input(InputLocation::Query, "page must be positive"))
        });
        let composed = compose(&global, RouteSpec::new([Method::GET]), handler).unwrap();

        let reply = composed
            .call(ApiRequest::new(Method::GET, "/items".parse().unwrap()))
            .await
            .unwrap();
        assert_eq!(reply.status, Some(StatusCode::BAD_REQUEST));
        assert_eq!(reply.headers.get(header::CONTENT_TYPE).unwrap(), "application/json");
        let body = body_json(&reply);
        assert_eq!(body["error"]["status"], 400);
        assert_eq!(body["error"]["location"], "query");
    }

    #[tokio::test]
    async fn test_method_errors_carry_allow() {
        let global = GlobalSpec::builder()
            .exception_handler(Arc::new(ExceptionHandler))
            .build();
        let handler = handler_fn(|_req, _ctx| async { Ok(crate::http::response::Reply::new()) });
        let composed = compose(&global, RouteSpec::new([Method::GET]), handler).unwrap();

        let reply = composed
            .call(ApiRequest::new(Method::DELETE, "/items".parse().unwrap()))
            .await
            .unwrap();
        assert_eq!(reply.status, Some(StatusCode::METHOD_NOT_ALLOWED));
        assert_eq!(reply.headers.get(header::ALLOW).unwrap(), "GET");
    }
}
