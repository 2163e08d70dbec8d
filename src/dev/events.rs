//! Build-started / build-finished signals.
//!
//! A `watch` channel over [`BuildState`] stands in for an event emitter:
//! "next build finished" is waiting until `building` is false, and "a build
//! started while I was loading" is an epoch that moved under the loader.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::observability::metrics;

/// Build epoch plus whether a build is currently running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildState {
    /// Incremented on every build start.
    pub epoch: u64,
    pub building: bool,
}

/// Producer side, owned by whatever drives the bundler.
#[derive(Debug, Clone)]
pub struct BuildEvents {
    tx: Arc<watch::Sender<BuildState>>,
}

impl Default for BuildEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildEvents {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(BuildState::default());
        Self { tx: Arc::new(tx) }
    }

    /// Enter `building` and open a new epoch.
    pub fn build_started(&self) -> u64 {
        let mut epoch = 0;
        self.tx.send_modify(|state| {
            state.epoch += 1;
            state.building = true;
            epoch = state.epoch;
        });
        metrics::record_build_event("started");
        info!(epoch, "Build started");
        epoch
    }

    /// Back to `idle`; waiters for a finished build are released.
    pub fn build_finished(&self) {
        let mut epoch = 0;
        self.tx.send_modify(|state| {
            state.building = false;
            epoch = state.epoch;
        });
        metrics::record_build_event("finished");
        info!(epoch, "Build finished");
    }

    pub fn state(&self) -> BuildState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> BuildSubscriber {
        BuildSubscriber {
            rx: self.tx.subscribe(),
        }
    }
}

/// Consumer side.
#[derive(Debug, Clone)]
pub struct BuildSubscriber {
    rx: watch::Receiver<BuildState>,
}

impl BuildSubscriber {
    pub fn state(&self) -> BuildState {
        *self.rx.borrow()
    }

    /// Resolve once no build is running. Returns immediately when idle.
    ///
    /// Never resolves while a build stays broken; that is accepted in dev
    /// mode.
    pub async fn idle(&mut self) -> BuildState {
        let settled = self
            .rx
            .wait_for(|state| !state.building)
            .await
            .map(|state| *state);
        // Sender gone: no build can start or finish anymore.
        settled.unwrap_or_else(|_| *self.rx.borrow())
    }
}
