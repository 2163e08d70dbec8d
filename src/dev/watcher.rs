//! Artifact watcher for dev mode.
//!
//! Watches the directory holding the artifact (so replace-by-rename is seen
//! too), collapses bursts of writes, and reports each burst as one build:
//! `build_started` on the first event, an optional rebuild hook, then
//! `build_finished` once the file has been quiet for the debounce window.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::dev::coordinator::BuildListener;

/// Runs between build start and finish, e.g. to invoke a bundler.
pub type RebuildHook = Arc<dyn Fn(PathBuf) -> BoxFuture<'static, ()> + Send + Sync>;

pub struct ArtifactWatcher {
    path: PathBuf,
    debounce: Duration,
    listener: Arc<dyn BuildListener>,
    rebuild: Option<RebuildHook>,
}

impl ArtifactWatcher {
    pub fn new(path: &Path, debounce: Duration, listener: Arc<dyn BuildListener>) -> Self {
        Self {
            path: path.to_path_buf(),
            debounce,
            listener,
            rebuild: None,
        }
    }

    pub fn with_rebuild(mut self, hook: RebuildHook) -> Self {
        self.rebuild = Some(hook);
        self
    }

    /// Start watching. The returned task owns the OS watcher and stops when
    /// `shutdown` fires.
    pub fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<JoinHandle<()>, notify::Error> {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let file_name = self.path.file_name().map(|name| name.to_os_string());

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let touches_artifact = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if touches_artifact && is_content_change(&event.kind) {
                        let _ = tx.send(());
                    }
                }
                Err(err) => tracing::error!(error = %err, "Artifact watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(1)),
        )?;

        let dir = self
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?self.path, debounce_ms = self.debounce.as_millis() as u64, "Artifact watcher started");

        Ok(tokio::spawn(async move {
            let _watcher = watcher;
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    changed = rx.recv() => {
                        if changed.is_none() {
                            break;
                        }
                        self.rebuild_once(&mut rx).await;
                    }
                }
            }
            tracing::info!(path = ?self.path, "Artifact watcher stopped");
        }))
    }

    async fn rebuild_once(&self, rx: &mut mpsc::UnboundedReceiver<()>) {
        self.listener.build_started();

        // Quiet period: every further event restarts the window.
        while let Ok(Some(())) = tokio::time::timeout(self.debounce, rx.recv()).await {}

        if let Some(hook) = &self.rebuild {
            hook(self.path.clone()).await;
        }
        self.listener.build_finished();
    }
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}
