//! routekit server binary.
//!
//! ```text
//!  Client ──▶ HttpServer (trace, request id, timeout)
//!               │
//!               ▼
//!           HandlerSource ── static: FetchRuntime built at startup
//!               │        └── dev:    BuildCoordinator ◀── ArtifactWatcher
//!               ▼
//!           Dispatcher ──▶ RouteTable ──▶ composed pipeline ──▶ handler
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use routekit::app;
use routekit::config::{load_config, ServerConfig};
use routekit::dev::{ArtifactWatcher, ManifestLoader};
use routekit::http::DevCoordinator;
use routekit::observability::{init_logging, metrics};
use routekit::{Dispatcher, HandlerSource, HttpServer, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "routekit", version, about = "File-routed API server")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serve from a watched route manifest
    #[arg(long)]
    dev: bool,

    /// Route manifest path (dev mode)
    #[arg(long)]
    artifact: Option<PathBuf>,

    /// Override listener.bind_address
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if args.dev {
        config.dev.enabled = true;
    }
    if let Some(artifact) = &args.artifact {
        config.dev.artifact_path = artifact.display().to_string();
    }
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    init_logging(&config.observability.log_filter);
    tracing::info!("routekit v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        dev = config.dev.enabled,
        validate_responses = config.pipeline.validate_responses,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(err) = metrics::init_metrics(addr) {
                    tracing::error!(error = %err, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let token = std::env::var("ROUTEKIT_TOKEN").unwrap_or_else(|_| {
        tracing::warn!("ROUTEKIT_TOKEN not set, using the development token");
        "dev-token".to_string()
    });
    let global = Arc::new(app::global_spec(config.pipeline.validate_responses, token));

    let shutdown = Shutdown::new();
    shutdown.trigger_on_ctrl_c();

    let source = if config.dev.enabled {
        let artifact = Path::new(&config.dev.artifact_path);
        let loader = Arc::new(ManifestLoader::new(
            Arc::clone(&global),
            Arc::new(app::registry()?),
            config.listener.body_limit_bytes,
        ));
        let coordinator = Arc::new(DevCoordinator::new(artifact, loader.clone(), loader));
        ArtifactWatcher::new(
            artifact,
            Duration::from_millis(config.dev.debounce_ms),
            coordinator.clone(),
        )
        .run(shutdown.subscribe())?;
        HandlerSource::Dev(coordinator)
    } else {
        let dispatcher = Dispatcher::from_modules(&global, app::routes()?)?
            .with_body_limit(config.listener.body_limit_bytes);
        tracing::info!(routes = dispatcher.table().len(), "Route table built");
        HandlerSource::fixed(dispatcher)
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    HttpServer::new(&config.listener, source)
        .run(listener, shutdown)
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
