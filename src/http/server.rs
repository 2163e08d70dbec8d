//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router: one fallback handler serves every path
//! - Wire up middleware (tracing, timeout, request ID)
//! - Resolve the runtime per request: fixed in production, from the build
//!   coordinator in dev mode
//! - Record request metrics
//! - Graceful shutdown through the lifecycle broadcast

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ListenerConfig;
use crate::dev::{BuildCoordinator, LoadError};
use crate::dispatcher::{Dispatcher, MatchedPattern};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::runtime::FetchRuntime;

/// Coordinator type used by the dev-mode host.
pub type DevCoordinator = BuildCoordinator<Dispatcher, FetchRuntime>;

/// Where the host gets the runtime for a request.
#[derive(Clone)]
pub enum HandlerSource {
    /// Routes fixed at startup.
    Static(FetchRuntime),
    /// Routes loaded from the current build of a watched artifact.
    Dev(Arc<DevCoordinator>),
}

impl HandlerSource {
    pub fn fixed(dispatcher: Dispatcher) -> Self {
        HandlerSource::Static(FetchRuntime::new(Arc::new(dispatcher)))
    }

    pub async fn runtime(&self) -> Result<FetchRuntime, LoadError> {
        match self {
            HandlerSource::Static(runtime) => Ok(runtime.clone()),
            HandlerSource::Dev(coordinator) => {
                let runtime = coordinator.get_runtime().await?;
                Ok(FetchRuntime::clone(&runtime))
            }
        }
    }
}

#[derive(Clone)]
struct AppState {
    source: HandlerSource,
}

/// HTTP host for a route set.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &ListenerConfig, source: HandlerSource) -> Self {
        let router = Self::build_router(config, AppState { source });
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ListenerConfig, state: AppState) -> Router {
        Router::new()
            .fallback(serve_request)
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let mut stop = shutdown.subscribe();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn serve_request(State(state): State<AppState>, request: Request<Body>) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();

    let runtime = match state.source.runtime().await {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!(error = %err, "Routes unavailable");
            metrics::record_request(&method, 503, "none", started);
            let mut response = (StatusCode::SERVICE_UNAVAILABLE, err.to_string()).into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
            return response;
        }
    };

    let response = runtime.fetch(request).await;
    let pattern = response
        .extensions()
        .get::<MatchedPattern>()
        .map_or("none", |matched| matched.0.as_str());
    metrics::record_request(&method, response.status().as_u16(), pattern, started);
    response
}
