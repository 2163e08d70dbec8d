//! First-success-wins auth resolution.
//!
//! Candidates are tried one at a time in the global declaration order. Each
//! gets an isolated copy of the request and context, and a continuation that
//! records whether it was reached:
//!
//! ```text
//! Ok(reply)                  -> done, later candidates never run
//! Err(e), next reached       -> downstream failure, propagate e as is
//! Err(e), next not reached   -> auth failure, collect e and try the next
//! ```
//!
//! When every candidate fails, the collected failures go to the configured
//! hook; without one the last failure is raised.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tracing::debug;

use crate::error::ApiError;
use crate::http::request::ApiRequest;
use crate::pipeline::compose::{AuthFailureHook, AuthSelector, ComposeError, GlobalSpec};
use crate::pipeline::context::Context;
use crate::pipeline::middleware::{Middleware, Next, PipelineResult};

pub(crate) struct AuthLayer {
    candidates: Vec<(String, Arc<dyn Middleware>)>,
    on_failures: Option<AuthFailureHook>,
}

impl AuthLayer {
    /// Select the route's candidates from the global auth map.
    pub(crate) fn resolve(global: &GlobalSpec, selector: &AuthSelector) -> Result<Self, ComposeError> {
        let wanted: Vec<&str> = match selector {
            AuthSelector::None => Vec::new(),
            AuthSelector::One(name) => vec![name.as_str()],
            AuthSelector::Any(names) => names.iter().map(String::as_str).collect(),
        };

        if let Some(unknown) = wanted
            .iter()
            .find(|name| !global.auth.iter().any(|(known, _)| known == **name))
        {
            return Err(ComposeError::UnknownAuth(unknown.to_string()));
        }

        let candidates = global
            .auth
            .iter()
            .filter(|(name, _)| wanted.contains(&name.as_str()))
            .cloned()
            .collect();

        Ok(Self {
            candidates,
            on_failures: global.on_auth_failures.clone(),
        })
    }

    fn collapse(&self, mut failures: Vec<ApiError>) -> ApiError {
        if let Some(replacement) = self.on_failures.as_ref().and_then(|hook| hook(&failures)) {
            return replacement;
        }
        failures
            .pop()
            .unwrap_or_else(|| ApiError::Unauthorized("no auth candidate accepted the request".into()))
    }
}

impl Middleware for AuthLayer {
    fn handle<'a>(
        &'a self,
        req: ApiRequest,
        ctx: Context,
        next: Next<'a>,
    ) -> BoxFuture<'a, PipelineResult> {
        Box::pin(async move {
            if self.candidates.is_empty() {
                return next.run(req, ctx).await;
            }

            let mut failures = Vec::with_capacity(self.candidates.len());
            for (name, candidate) in &self.candidates {
                let reached = AtomicBool::new(false);
                let trial = req.fork();
                let defaults = trial.response_defaults().clone();
                let outcome = candidate
                    .handle(trial, ctx.clone(), next.guarded(&reached))
                    .await;

                // An accepted trial's defaults become the request's.
                match outcome {
                    Ok(reply) => {
                        req.response_defaults().apply(defaults.snapshot());
                        return Ok(reply);
                    }
                    Err(err) if reached.load(Ordering::SeqCst) => {
                        req.response_defaults().apply(defaults.snapshot());
                        return Err(err);
                    }
                    Err(err) => {
                        debug!(auth = %name, error = %err, "Auth candidate rejected request");
                        failures.push(err);
                    }
                }
            }

            Err(self.collapse(failures))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
    use serde_json::json;

    use super::*;
    use crate::http::response::Reply;
    use crate::pipeline::compose::{compose, RouteSpec};
    use crate::pipeline::context::Identity;
    use crate::pipeline::exception::ExceptionHandler;
    use crate::pipeline::middleware::{handler_fn, middleware_fn};

    fn header_auth(scheme: &'static str, header: &'static str, calls: Arc<AtomicUsize>) -> Arc<dyn Middleware> {
        middleware_fn(move |req, mut ctx, next| {
            let calls = Arc::clone(&calls);
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let Some(subject) = req.header(header).map(str::to_string) else {
                    return Err(ApiError::Unauthorized(format!("{scheme}: missing {header}")));
                };
                ctx.set_identity(Identity::new(scheme, subject));
                next.run(req, ctx).await
            })
        })
    }

    fn whoami() -> Arc<dyn crate::pipeline::middleware::Endpoint> {
        handler_fn(|_req, ctx: Context| async move {
            let scheme = ctx.identity().map(|id| id.scheme.clone());
            Ok(Reply::json(json!({ "scheme": scheme })))
        })
    }

    fn request(headers: &[(&'static str, &'static str)]) -> ApiRequest {
        headers.iter().fold(
            ApiRequest::new(Method::GET, "/me".parse().unwrap()),
            |req, &(name, value)| {
                req.with_header(HeaderName::from_static(name), HeaderValue::from_static(value))
            },
        )
    }

    fn json_body(reply: &Reply) -> serde_json::Value {
        serde_json::from_slice(match &reply.body {
            Some(crate::http::response::ReplyBody::Raw(bytes)) => bytes,
            other => panic!("expected serialized body, got {other:?}"),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_second_candidate_wins_without_hook() {
        let hook_calls = Arc::new(AtomicUsize::new(0));
        let hook_seen = Arc::clone(&hook_calls);
        let global = GlobalSpec::builder()
            .auth("a", header_auth("a", "x-a", Arc::default()))
            .auth("b", header_auth("b", "x-b", Arc::default()))
            .on_auth_failures(move |_failures| {
                hook_seen.fetch_add(1, Ordering::SeqCst);
                None
            })
            .build();
        let route = RouteSpec::new([Method::GET])
            .auth(AuthSelector::Any(vec!["a".into(), "b".into()]));
        let handler = compose(&global, route, whoami()).unwrap();

        let reply = handler.call(request(&[("x-b", "bob")])).await.unwrap();
        assert_eq!(json_body(&reply), json!({"scheme": "b"}));
        assert_eq!(hook_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_fail_goes_through_hook_in_trial_order() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let global = GlobalSpec::builder()
            .auth("a", header_auth("a", "x-a", Arc::default()))
            .auth("b", header_auth("b", "x-b", Arc::default()))
            .on_auth_failures(move |failures| {
                *sink.lock().unwrap() = failures.iter().map(ToString::to_string).collect();
                Some(ApiError::Forbidden("composite".into()))
            })
            .build();
        // Route lists b first; trial order still follows the global map.
        let route = RouteSpec::new([Method::GET])
            .auth(AuthSelector::Any(vec!["b".into(), "a".into()]));
        let handler = compose(&global, route, whoami()).unwrap();

        let err = handler.call(request(&[])).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(ref m) if m == "composite"));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "unauthorized: a: missing x-a".to_string(),
                "unauthorized: b: missing x-b".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_last_failure_without_hook() {
        let global = GlobalSpec::builder()
            .auth("a", header_auth("a", "x-a", Arc::default()))
            .auth("b", header_auth("b", "x-b", Arc::default()))
            .build();
        let route = RouteSpec::new([Method::GET])
            .auth(AuthSelector::Any(vec!["a".into(), "b".into()]));
        let handler = compose(&global, route, whoami()).unwrap();

        let err = handler.call(request(&[])).await.unwrap_err();
        assert_eq!(err.to_string(), "unauthorized: b: missing x-b");
    }

    #[tokio::test]
    async fn test_downstream_failure_is_not_an_auth_failure() {
        let b_calls = Arc::new(AtomicUsize::new(0));
        let global = GlobalSpec::builder()
            .auth("a", header_auth("a", "x-a", Arc::default()))
            .auth("b", header_auth("b", "x-b", Arc::clone(&b_calls)))
            .build();
        let route = RouteSpec::new([Method::GET])
            .auth(AuthSelector::Any(vec!["a".into(), "b".into()]));
        let failing = handler_fn(|_req, _ctx| async {
            Err(ApiError::http(StatusCode::CONFLICT, "handler blew up"))
        });
        let handler = compose(&global, route, failing).unwrap();

        let err = handler
            .call(request(&[("x-a", "ann"), ("x-b", "bob")]))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(b_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_candidate_does_not_leak_defaults() {
        let leaky = middleware_fn(|req, _ctx, _next| {
            Box::pin(async move {
                req.response_defaults()
                    .set_header(HeaderName::from_static("x-leak"), HeaderValue::from_static("1"));
                Err(ApiError::Unauthorized("leaky".into()))
            })
        });
        let global = GlobalSpec::builder()
            .auth("leaky", leaky)
            .auth("b", header_auth("b", "x-b", Arc::default()))
            .build();
        let route = RouteSpec::new([Method::GET])
            .auth(AuthSelector::Any(vec!["leaky".into(), "b".into()]));
        let handler = compose(&global, route, whoami()).unwrap();

        let reply = handler.call(request(&[("x-b", "bob")])).await.unwrap();
        assert!(!reply.headers.contains_key("x-leak"));
    }

    #[tokio::test]
    async fn test_hook_without_replacement_raises_last_failure() {
        let global = GlobalSpec::builder()
            .auth("a", header_auth("a", "x-a", Arc::default()))
            .auth("b", header_auth("b", "x-b", Arc::default()))
            .on_auth_failures(|failures| {
                assert_eq!(failures.len(), 2);
                None
            })
            .build();
        let route = RouteSpec::new([Method::GET])
            .auth(AuthSelector::Any(vec!["a".into(), "b".into()]));
        let handler = compose(&global, route, whoami()).unwrap();

        let err = handler.call(request(&[])).await.unwrap_err();
        assert_eq!(err.to_string(), "unauthorized: b: missing x-b");
    }

    #[tokio::test]
    async fn test_defaults_after_auth_reach_error_replies() {
        let set_route_header = || {
            middleware_fn(|req, ctx, next| {
                req.response_defaults()
                    .set_header(HeaderName::from_static("x-route"), HeaderValue::from_static("1"));
                next.run(req, ctx)
            })
        };
        let forbidden = || handler_fn(|_req, _ctx| async { Err(ApiError::Forbidden("no".into())) });
        let global = GlobalSpec::builder()
            .exception_handler(Arc::new(ExceptionHandler))
            .auth("b", header_auth("b", "x-b", Arc::default()))
            .build();

        let open = compose(
            &global,
            RouteSpec::new([Method::GET]).middleware(set_route_header()),
            forbidden(),
        )
        .unwrap();
        let guarded = compose(
            &global,
            RouteSpec::new([Method::GET])
                .auth(AuthSelector::One("b".into()))
                .middleware(set_route_header()),
            forbidden(),
        )
        .unwrap();

        for handler in [open, guarded] {
            let reply = handler.call(request(&[("x-b", "bob")])).await.unwrap();
            assert_eq!(reply.status, Some(StatusCode::FORBIDDEN));
            assert_eq!(reply.headers["x-route"], "1");
        }
    }

    #[test]
    fn test_unknown_auth_name_is_rejected() {
        let global = GlobalSpec::builder()
            .auth("token", header_auth("token", "x-token", Arc::default()))
            .build();
        let route = RouteSpec::new([Method::GET]).auth(AuthSelector::One("session".into()));
        let err = compose(&global, route, whoami()).unwrap_err();
        assert!(matches!(err, ComposeError::UnknownAuth(ref name) if name == "session"));
    }
}
