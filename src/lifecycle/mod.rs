//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Publish → Start watcher and signal handlers
//!
//! Reload (reload.rs):
//!     Trigger → Load → Validate → Publish (atomic swap) | Reject (keep current)
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Trigger config reload
//!
//! Shutdown (shutdown.rs):
//!     Broadcast to every long-running task → Exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then watchers
//! - One reload attempt in flight at a time

pub mod reload;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use reload::{ReloadController, ReloadError, ReloadState};
pub use shutdown::Shutdown;
