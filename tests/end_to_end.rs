//! End-to-end tests against a live server on an ephemeral port.

mod common;

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, Method};
use reqwest::StatusCode;
use serde_json::{json, Value};

use routekit::app;
use routekit::pipeline::{handler_fn, middleware_fn, ExceptionHandler};
use routekit::routing::RouteSource;
use routekit::{Dispatcher, GlobalSpec, HandlerSource, Reply, RouteModule, RouteSpec};

async fn demo_server() -> (String, routekit::Shutdown) {
    let global = app::global_spec(true, common::TOKEN);
    let dispatcher = Dispatcher::from_modules(&global, app::routes().unwrap()).unwrap();
    let (addr, shutdown) = common::spawn_server(HandlerSource::fixed(dispatcher)).await;
    (format!("http://{addr}"), shutdown)
}

#[tokio::test]
async fn test_route_param_is_validated_and_coerced() {
    let (base, shutdown) = demo_server().await;
    let client = common::client();

    let resp = client.get(format!("{base}/hello/4")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-powered-by"], "routekit");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "world": 4 }));

    let resp = client
        .get(format!("{base}/hello/notanumber"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.headers()["x-powered-by"], "routekit");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["status"], 400);
    assert_eq!(body["error"]["location"], "route params");

    shutdown.trigger();
}

#[tokio::test]
async fn test_bearer_token_auth() {
    let (base, shutdown) = demo_server().await;
    let client = common::client();

    let resp = client.get(format!("{base}/me")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.headers()["x-powered-by"], "routekit");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["status"], 401);

    let resp = client
        .get(format!("{base}/me"))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = client
        .get(format!("{base}/me"))
        .bearer_auth(common::TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["scheme"], "token");
    assert_eq!(body["subject"], "token-holder");

    shutdown.trigger();
}

#[tokio::test]
async fn test_not_found_and_method_not_allowed() {
    let (base, shutdown) = demo_server().await;
    let client = common::client();

    let resp = client.get(format!("{base}/no/such/route")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(resp.text().await.unwrap(), "Not Found");

    let resp = client.delete(format!("{base}/hello/4")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(resp.headers()["allow"], "GET");

    shutdown.trigger();
}

#[tokio::test]
async fn test_json_body_route() {
    let (base, shutdown) = demo_server().await;
    let client = common::client();

    let resp = client
        .post(format!("{base}/echo"))
        .json(&json!({ "message": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "echo": { "message": "hi" } }));

    let resp = client
        .post(format!("{base}/echo"))
        .json(&json!({ "message": 7 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = client
        .post(format!("{base}/echo"))
        .header("content-type", "text/plain")
        .body("hi")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    shutdown.trigger();
}

#[tokio::test]
async fn test_index_route_and_request_id() {
    let (base, shutdown) = demo_server().await;
    let client = common::client();

    let resp = client.get(format!("{base}/")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("x-request-id"));
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["service"], "routekit");

    let resp = client
        .get(format!("{base}/index"))
        .header("x-request-id", "abc-123")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-request-id"], "abc-123");

    shutdown.trigger();
}

#[tokio::test]
async fn test_route_middleware_overrides_global_header() {
    let header = HeaderName::from_static("x-test");
    let base_header = header.clone();
    let global = GlobalSpec::builder()
        .exception_handler(Arc::new(ExceptionHandler))
        .before_auth(middleware_fn(move |req, ctx, next| {
            req.response_defaults()
                .set_header(base_header.clone(), HeaderValue::from_static("base"));
            next.run(req, ctx)
        }))
        .build();

    let override_header = header.clone();
    let source = RouteSource::new()
        .route(
            "plain.ts",
            RouteModule::new(
                RouteSpec::new([Method::GET]),
                handler_fn(|_req, _ctx| async { Ok(Reply::json(json!({ "ok": true }))) }),
            ),
        )
        .route(
            "custom.ts",
            RouteModule::new(
                RouteSpec::new([Method::GET]).middleware(middleware_fn(move |req, ctx, next| {
                    req.response_defaults()
                        .set_header(override_header.clone(), HeaderValue::from_static("override"));
                    next.run(req, ctx)
                })),
                handler_fn(|_req, _ctx| async { Ok(Reply::json(json!({ "ok": true }))) }),
            ),
        );

    let source = source.route(
        "early.ts",
        RouteModule::new(
            RouteSpec::new([Method::GET]).middleware(middleware_fn(|_req, _ctx, _next| {
                Box::pin(async { Ok(Reply::raw("from middleware")) })
            })),
            handler_fn(|_req, _ctx| async { Ok(Reply::raw("from handler")) }),
        ),
    );

    let dispatcher = Dispatcher::from_modules(&global, source).unwrap();
    let (addr, shutdown) = common::spawn_server(HandlerSource::fixed(dispatcher)).await;
    let client = common::client();

    let resp = client.get(format!("http://{addr}/plain")).send().await.unwrap();
    assert_eq!(resp.headers()["x-test"], "base");

    let resp = client.get(format!("http://{addr}/early")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-test"], "base");
    assert_eq!(resp.text().await.unwrap(), "from middleware");

    let resp = client.get(format!("http://{addr}/custom")).send().await.unwrap();
    assert_eq!(resp.headers()["x-test"], "override");
    assert_eq!(resp.headers().get_all("x-test").iter().count(), 1);

    shutdown.trigger();
}
