//! Configuration schema definitions.
//!
//! Every section derives Serde traits and carries `#[serde(default)]`, so an
//! empty file (or no file) yields a working configuration.

use serde::{Deserialize, Serialize};

/// Root configuration for the route server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address and request limits.
    pub listener: ListenerConfig,

    /// Pipeline-wide behaviour (the global spec toggles).
    pub pipeline: PipelineConfig,

    /// Dev-mode artifact watching.
    pub dev: DevConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Maximum buffered request body in bytes.
    pub body_limit_bytes: usize,

    /// Total time allowed for one request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            body_limit_bytes: 2 * 1024 * 1024,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Validate typed handler replies against their output schemas.
    pub validate_responses: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            validate_responses: true,
        }
    }
}

/// Dev-mode configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DevConfig {
    /// Serve from a watched, rebuilt artifact instead of a fixed route set.
    pub enabled: bool,

    /// Route manifest produced by the bundler.
    pub artifact_path: String,

    /// Quiet period before a burst of changes counts as one build.
    pub debounce_ms: u64,
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            artifact_path: "routes.toml".to_string(),
            debounce_ms: 100,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "routekit=debug,tower_http=debug".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9100".to_string(),
        }
    }
}
