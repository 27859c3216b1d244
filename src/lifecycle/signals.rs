//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to internal events
//! - Trigger appropriate actions (shutdown, reload)
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Handlers are registered once, up front, so no signal is missed
//! - SIGHUP triggers config reload, not shutdown

use std::io;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::lifecycle::shutdown::Shutdown;

/// What a received signal asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    Reload,
    Shutdown,
}

/// Registered signal streams.
pub struct Signals {
    #[cfg(unix)]
    hangup: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl Signals {
    pub fn register() -> io::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            Ok(Self {
                hangup: signal(SignalKind::hangup())?,
                terminate: signal(SignalKind::terminate())?,
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Wait for the next signal.
    pub async fn recv(&mut self) -> SignalEvent {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.hangup.recv() => SignalEvent::Reload,
                _ = self.terminate.recv() => SignalEvent::Shutdown,
                _ = tokio::signal::ctrl_c() => SignalEvent::Shutdown,
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            SignalEvent::Shutdown
        }
    }
}

/// Route signals until shutdown: reload requests go to `reload_tx`,
/// SIGINT/SIGTERM trigger the shutdown coordinator.
pub async fn forward(mut signals: Signals, reload_tx: mpsc::UnboundedSender<()>, shutdown: Arc<Shutdown>) {
    loop {
        match signals.recv().await {
            SignalEvent::Reload => {
                tracing::info!("SIGHUP received, reloading configuration");
                if reload_tx.send(()).is_err() {
                    return;
                }
            }
            SignalEvent::Shutdown => {
                tracing::info!("Shutdown signal received");
                shutdown.trigger();
                return;
            }
        }
    }
}
