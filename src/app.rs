//! Demo application served by the `routekit` binary.
//!
//! Routes (file path → module):
//!
//! | File              | Module  | Behaviour                                   |
//! |-------------------|---------|---------------------------------------------|
//! | `index.ts`        | `index` | service banner on `/` and `/index`          |
//! | `hello/[world].ts`| `hello` | integer route param, echoed back            |
//! | `me.ts`           | `me`    | bearer-token auth, returns the identity     |
//! | `echo.ts`         | `echo`  | JSON body validated and echoed (POST only)  |

use std::sync::Arc;

use axum::http::{header, HeaderName, HeaderValue, Method, StatusCode};
use futures_util::future::BoxFuture;
use serde_json::{json, Value};

use crate::dev::ModuleRegistry;
use crate::dispatcher::RouteModule;
use crate::error::ApiError;
use crate::http::request::ApiRequest;
use crate::http::response::Reply;
use crate::pipeline::{
    handler_fn, middleware_fn, AuthSelector, Context, ExceptionHandler, GlobalSpec, Identity,
    InputSchemas, Middleware, Next, OutputSchemas, PipelineResult, RouteSpec,
};
use crate::routing::RouteSource;
use crate::schema::{JsonSchema, SchemaError};

/// Route files and the module serving each, in declaration order.
pub const ROUTES: &[(&str, &str)] = &[
    ("index.ts", "index"),
    ("hello/[world].ts", "hello"),
    ("me.ts", "me"),
    ("echo.ts", "echo"),
];

/// The same routes as a dev-mode manifest.
pub fn manifest_toml() -> String {
    ROUTES
        .iter()
        .map(|(file, module)| format!("[[route]]\nfile = \"{file}\"\nmodule = \"{module}\"\n"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Accepts `Authorization: Bearer <token>` for one configured token.
pub struct BearerToken {
    token: String,
}

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl Middleware for BearerToken {
    fn handle<'a>(
        &'a self,
        req: ApiRequest,
        mut ctx: Context,
        next: Next<'a>,
    ) -> BoxFuture<'a, PipelineResult> {
        let presented = req
            .header(header::AUTHORIZATION)
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim);

        if presented != Some(self.token.as_str()) {
            return Box::pin(async {
                Err(ApiError::Unauthorized("invalid or missing bearer token".into()))
            });
        }

        let mut identity = Identity::new("token", "token-holder");
        identity.claims = json!({ "via": "bearer" });
        ctx.set_identity(identity);
        next.run(req, ctx)
    }
}

/// Global spec for the demo: exception handling, a banner header set
/// before auth, and the `token` auth middleware.
pub fn global_spec(validate_responses: bool, token: impl Into<String>) -> GlobalSpec {
    let banner = middleware_fn(|req, ctx, next| {
        req.response_defaults().set_header(
            HeaderName::from_static("x-powered-by"),
            HeaderValue::from_static("routekit"),
        );
        next.run(req, ctx)
    });

    GlobalSpec::builder()
        .exception_handler(Arc::new(ExceptionHandler))
        .before_auth(banner)
        .auth("token", Arc::new(BearerToken::new(token)))
        .validate_responses(validate_responses)
        .build()
}

/// Compiled route modules by name.
pub fn registry() -> Result<ModuleRegistry, SchemaError> {
    Ok(ModuleRegistry::new()
        .register("index", index())
        .register("hello", hello()?)
        .register("me", me())
        .register("echo", echo()?))
}

/// Route source for a fixed (non-dev) server.
pub fn routes() -> Result<RouteSource<RouteModule>, SchemaError> {
    let registry = registry()?;
    Ok(ROUTES
        .iter()
        .filter_map(|(file, module)| registry.get(module).cloned().map(|m| (*file, m)))
        .collect())
}

fn index() -> RouteModule {
    RouteModule::new(
        RouteSpec::new([Method::GET, Method::HEAD]),
        handler_fn(|_req, _ctx| async {
            Ok(Reply::json(json!({
                "service": "routekit",
                "version": env!("CARGO_PKG_VERSION"),
            })))
        }),
    )
}

fn hello() -> Result<RouteModule, SchemaError> {
    let spec = RouteSpec::new([Method::GET])
        .input(InputSchemas {
            params: Some(JsonSchema::shared(json!({
                "type": "object",
                "required": ["world"],
                "properties": { "world": { "type": "integer" } }
            }))?),
            ..InputSchemas::default()
        })
        .output(OutputSchemas {
            json: Some(JsonSchema::shared(json!({
                "type": "object",
                "required": ["world"],
                "properties": { "world": { "type": "integer" } }
            }))?),
            ..OutputSchemas::default()
        });

    Ok(RouteModule::new(
        spec,
        handler_fn(|_req, ctx: Context| async move {
            let world = ctx
                .input()
                .params
                .as_ref()
                .and_then(|params| params.get("world"))
                .cloned()
                .unwrap_or(Value::Null);
            Ok(Reply::json(json!({ "world": world })))
        }),
    ))
}

fn me() -> RouteModule {
    RouteModule::new(
        RouteSpec::new([Method::GET]).auth(AuthSelector::Any(vec!["token".into()])),
        handler_fn(|_req, ctx: Context| async move {
            let identity = ctx
                .identity()
                .ok_or_else(|| ApiError::internal("auth layer passed without an identity"))?;
            Ok(Reply::json(json!({
                "scheme": identity.scheme,
                "subject": identity.subject,
                "claims": identity.claims,
            })))
        }),
    )
}

fn echo() -> Result<RouteModule, SchemaError> {
    let spec = RouteSpec::new([Method::POST]).input(InputSchemas {
        json: Some(JsonSchema::shared(json!({
            "type": "object",
            "required": ["message"],
            "properties": { "message": { "type": "string" } }
        }))?),
        ..InputSchemas::default()
    });

    Ok(RouteModule::new(
        spec,
        handler_fn(|_req, ctx: Context| async move {
            let body = ctx.input().json.clone().unwrap_or(Value::Null);
            Ok(Reply::json(json!({ "echo": body })).with_status(StatusCode::CREATED))
        }),
    ))
}
