//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Ctrl+C or trigger() → HTTP host stops accepting and drains
//!                         → artifact watcher stops
//! ```

pub mod shutdown;

pub use shutdown::Shutdown;
