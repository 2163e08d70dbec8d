//! Build coordinator.
//!
//! # Responsibilities
//! - Track `idle` / `building` transitions reported by the watcher
//! - Lazily load the composed handler and the runtime from the artifact
//! - Never hand out a resource loaded from an artifact that was replaced
//!   while the load was running
//!
//! # Protected Load
//! ```text
//! cache hit for current epoch        -> return it, no lock
//! else lock resource
//!   loop:
//!     wait until idle, note epoch
//!     cache hit for that epoch       -> return it (someone else loaded)
//!     run loader
//!     epoch moved during load        -> discard, loop
//!     store (epoch, value), return
//! ```
//!
//! # Design Decisions
//! - One `tokio::sync::Mutex` per resource: a burst of misses runs one load
//! - Cached entries carry their epoch so a store racing a build start can
//!   never be served
//! - Waiting for a build to finish has no timeout

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::dev::events::{BuildEvents, BuildState, BuildSubscriber};
use crate::error::SetupError;
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse artifact {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("artifact references unknown route module `{0}`")]
    UnknownModule(String),

    #[error(transparent)]
    Setup(#[from] SetupError),
}

/// Builds a resource from the artifact on disk.
pub trait ArtifactLoader<T>: Send + Sync {
    fn load<'a>(&'a self, artifact: &'a Path) -> BoxFuture<'a, Result<T, LoadError>>;
}

struct LoaderFn<F>(F);

impl<T, F, Fut> ArtifactLoader<T> for LoaderFn<F>
where
    F: Fn(PathBuf) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, LoadError>> + Send + 'static,
{
    fn load<'a>(&'a self, artifact: &'a Path) -> BoxFuture<'a, Result<T, LoadError>> {
        Box::pin((self.0)(artifact.to_path_buf()))
    }
}

/// Adapt an async function into a loader.
pub fn loader_fn<T, F, Fut>(f: F) -> Arc<dyn ArtifactLoader<T>>
where
    T: 'static,
    F: Fn(PathBuf) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, LoadError>> + Send + 'static,
{
    Arc::new(LoaderFn(f))
}

/// Receives build transitions from whatever watches the bundler.
pub trait BuildListener: Send + Sync {
    fn build_started(&self);
    fn build_finished(&self);
}

struct Cached<T> {
    epoch: u64,
    value: Arc<T>,
}

/// Lazily loaded, build-aware cache for one resource.
pub struct ProtectedCache<T> {
    resource: &'static str,
    slot: ArcSwapOption<Cached<T>>,
    lock: Mutex<()>,
}

impl<T: Send + Sync + 'static> ProtectedCache<T> {
    pub fn new(resource: &'static str) -> Self {
        Self {
            resource,
            slot: ArcSwapOption::empty(),
            lock: Mutex::new(()),
        }
    }

    fn peek(&self, state: BuildState) -> Option<Arc<T>> {
        if state.building {
            return None;
        }
        self.slot
            .load_full()
            .filter(|cached| cached.epoch == state.epoch)
            .map(|cached| Arc::clone(&cached.value))
    }

    pub fn clear(&self) {
        self.slot.store(None);
    }

    pub fn is_cached(&self) -> bool {
        self.slot.load().is_some()
    }

    /// Return the cached value or run the protected load.
    pub async fn get(
        &self,
        mut builds: BuildSubscriber,
        loader: &dyn ArtifactLoader<T>,
        artifact: &Path,
    ) -> Result<Arc<T>, LoadError> {
        if let Some(value) = self.peek(builds.state()) {
            return Ok(value);
        }

        let _guard = self.lock.lock().await;
        loop {
            let started = builds.idle().await;
            if let Some(value) = self.peek(started) {
                return Ok(value);
            }

            debug!(resource = self.resource, epoch = started.epoch, "Loading from artifact");
            let loaded = loader.load(artifact).await;

            let current = builds.state();
            if current.epoch != started.epoch {
                warn!(
                    resource = self.resource,
                    loaded_epoch = started.epoch,
                    current_epoch = current.epoch,
                    "Build started during load, discarding result"
                );
                metrics::record_artifact_load(self.resource, "stale");
                continue;
            }

            let value = match loaded {
                Ok(value) => Arc::new(value),
                Err(err) => {
                    metrics::record_artifact_load(self.resource, "error");
                    return Err(err);
                }
            };
            self.slot.store(Some(Arc::new(Cached {
                epoch: started.epoch,
                value: Arc::clone(&value),
            })));
            metrics::record_artifact_load(self.resource, "loaded");
            return Ok(value);
        }
    }
}

/// Serves the composed handler (`H`) and runtime (`R`) for the current
/// build of one artifact.
pub struct BuildCoordinator<H, R> {
    artifact: PathBuf,
    events: BuildEvents,
    handler: ProtectedCache<H>,
    runtime: ProtectedCache<R>,
    handler_loader: Arc<dyn ArtifactLoader<H>>,
    runtime_loader: Arc<dyn ArtifactLoader<R>>,
}

impl<H, R> BuildCoordinator<H, R>
where
    H: Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    pub fn new(
        artifact: impl Into<PathBuf>,
        handler_loader: Arc<dyn ArtifactLoader<H>>,
        runtime_loader: Arc<dyn ArtifactLoader<R>>,
    ) -> Self {
        Self {
            artifact: artifact.into(),
            events: BuildEvents::new(),
            handler: ProtectedCache::new("handler"),
            runtime: ProtectedCache::new("runtime"),
            handler_loader,
            runtime_loader,
        }
    }

    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    pub fn state(&self) -> BuildState {
        self.events.state()
    }

    pub fn subscribe(&self) -> BuildSubscriber {
        self.events.subscribe()
    }

    pub fn is_cached(&self) -> (bool, bool) {
        (self.handler.is_cached(), self.runtime.is_cached())
    }

    /// Current build's composed handler.
    ///
    /// The bundled [`HttpServer`](crate::http::HttpServer) only needs
    /// [`get_runtime`](Self::get_runtime). This is for embedders that drive
    /// the handler from their own host, e.g. calling
    /// [`Dispatcher::handle`](crate::dispatcher::Dispatcher::handle) or
    /// mounting it. Loaded on first use, cleared with the runtime on every
    /// build start.
    pub async fn get_handler(&self) -> Result<Arc<H>, LoadError> {
        self.handler
            .get(self.events.subscribe(), self.handler_loader.as_ref(), &self.artifact)
            .await
    }

    /// Current build's runtime, as served by the HTTP host.
    pub async fn get_runtime(&self) -> Result<Arc<R>, LoadError> {
        self.runtime
            .get(self.events.subscribe(), self.runtime_loader.as_ref(), &self.artifact)
            .await
    }
}

impl<H, R> BuildListener for BuildCoordinator<H, R>
where
    H: Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    fn build_started(&self) {
        self.events.build_started();
        self.handler.clear();
        self.runtime.clear();
    }

    fn build_finished(&self) {
        self.events.build_finished();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::sync::Notify;

    use super::*;

    #[derive(Debug)]
    struct Artifact {
        version: u64,
    }

    fn counting_loader(
        version: Arc<AtomicU64>,
        calls: Arc<AtomicUsize>,
        delay: Duration,
    ) -> Arc<dyn ArtifactLoader<Artifact>> {
        loader_fn(move |_path| {
            let version = Arc::clone(&version);
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let version = version.load(Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                Ok(Artifact { version })
            }
        })
    }

    #[tokio::test]
    async fn test_concurrent_misses_load_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = counting_loader(Arc::new(AtomicU64::new(1)), Arc::clone(&calls), Duration::from_millis(50));
        let runtime = counting_loader(Arc::default(), Arc::default(), Duration::ZERO);
        let coordinator = Arc::new(BuildCoordinator::new("routes.toml", loader, runtime));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let coordinator = Arc::clone(&coordinator);
                tokio::spawn(async move { coordinator.get_handler().await.unwrap() })
            })
            .collect();

        let mut handlers = Vec::new();
        for task in tasks {
            handlers.push(task.await.unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(handlers.iter().all(|h| Arc::ptr_eq(h, &handlers[0])));
    }

    #[tokio::test]
    async fn test_build_during_load_waits_and_reloads() {
        let version = Arc::new(AtomicU64::new(1));
        let calls = Arc::new(AtomicUsize::new(0));
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());

        let loader = {
            let (version, calls) = (Arc::clone(&version), Arc::clone(&calls));
            let (entered, release) = (Arc::clone(&entered), Arc::clone(&release));
            loader_fn(move |_path| {
                let (version, calls) = (Arc::clone(&version), Arc::clone(&calls));
                let (entered, release) = (Arc::clone(&entered), Arc::clone(&release));
                async move {
                    let seen = version.load(Ordering::SeqCst);
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        entered.notify_one();
                        release.notified().await;
                    }
                    Ok(Artifact { version: seen })
                }
            })
        };
        let runtime = counting_loader(Arc::clone(&version), Arc::default(), Duration::ZERO);
        let coordinator = Arc::new(BuildCoordinator::new("routes.toml", loader, runtime));

        let pending = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.get_handler().await.unwrap() })
        };

        entered.notified().await;
        coordinator.build_started();
        version.store(2, Ordering::SeqCst);
        release.notify_one();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pending.is_finished(), "resolved before the build finished");

        coordinator.build_finished();
        let handler = pending.await.unwrap();
        assert_eq!(handler.version, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_build_start_clears_both_caches() {
        let version = Arc::new(AtomicU64::new(1));
        let coordinator = BuildCoordinator::new(
            "routes.toml",
            counting_loader(Arc::clone(&version), Arc::default(), Duration::ZERO),
            counting_loader(Arc::clone(&version), Arc::default(), Duration::ZERO),
        );

        assert_eq!(coordinator.get_handler().await.unwrap().version, 1);
        assert_eq!(coordinator.get_runtime().await.unwrap().version, 1);
        assert_eq!(coordinator.is_cached(), (true, true));

        coordinator.build_started();
        assert_eq!(coordinator.is_cached(), (false, false));
        version.store(2, Ordering::SeqCst);
        coordinator.build_finished();

        assert_eq!(coordinator.get_handler().await.unwrap().version, 2);
        assert_eq!(coordinator.get_runtime().await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_loader_error_is_not_cached() {
        let fail = Arc::new(std::sync::atomic::AtomicBool::new(true));
        let loader = {
            let fail = Arc::clone(&fail);
            loader_fn(move |path| {
                let fail = fail.load(Ordering::SeqCst);
                async move {
                    if fail {
                        Err(LoadError::Parse {
                            path,
                            message: "broken".into(),
                        })
                    } else {
                        Ok(Artifact { version: 1 })
                    }
                }
            })
        };
        let coordinator = BuildCoordinator::new(
            "routes.toml",
            loader,
            counting_loader(Arc::default(), Arc::default(), Duration::ZERO),
        );

        assert!(coordinator.get_handler().await.is_err());
        fail.store(false, Ordering::SeqCst);
        assert_eq!(coordinator.get_handler().await.unwrap().version, 1);
    }
}
