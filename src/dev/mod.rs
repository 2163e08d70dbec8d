//! Dev-mode build coordination.
//!
//! # Data Flow
//! ```text
//! artifact file changes
//!     → watcher.rs (notify, debounce)
//!     → coordinator.build_started() / build_finished()
//!     → events.rs (watch channel: epoch + building flag)
//!
//! request arrives
//!     → coordinator.get_runtime()
//!     → cached for this epoch? serve
//!     → else protected load via manifest.rs, retried if a build raced it
//! ```

pub mod coordinator;
pub mod events;
pub mod manifest;
pub mod watcher;

pub use coordinator::{loader_fn, ArtifactLoader, BuildCoordinator, BuildListener, LoadError, ProtectedCache};
pub use events::{BuildEvents, BuildState, BuildSubscriber};
pub use manifest::{ManifestLoader, ModuleRegistry, RouteManifest};
pub use watcher::{ArtifactWatcher, RebuildHook};
