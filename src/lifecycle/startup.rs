//! Startup orchestration and the reload loop.
//!
//! # Responsibilities
//! - Load and validate the initial configuration
//! - Start the file watcher and signal forwarding
//! - Drive reloads until shutdown
//!
//! # Design Decisions
//! - Fail fast: an invalid initial configuration is fatal
//! - A failed reload is never fatal; the running snapshot stays
//! - Reloads run on the blocking pool (they read files)
//! - The watcher is re-armed from every published snapshot, so it follows
//!   the latest sources and include directories

use std::path::PathBuf;
use std::sync::Arc;

use notify::RecommendedWatcher;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::config::error::ConfigError;
use crate::config::interpolate::{EnvSource, ProcessEnv};
use crate::config::model::ResolvedConfig;
use crate::config::watcher::{ConfigChanged, ConfigWatcher};
use crate::lifecycle::reload::{ReloadController, ReloadError};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::{self, Signals};

/// Options for [`run`].
#[derive(Debug, Clone)]
pub struct StartupOptions {
    pub config_path: PathBuf,
    /// Reload when a source file changes.
    pub watch: bool,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("initial configuration is invalid: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to register signal handlers: {0}")]
    Signals(#[source] std::io::Error),

    #[error("failed to start config watcher: {0}")]
    Watcher(#[from] notify::Error),
}

/// Bootstrap and serve reloads until SIGINT/SIGTERM.
pub async fn run(opts: StartupOptions) -> Result<(), StartupError> {
    let env: Arc<dyn EnvSource> = Arc::new(ProcessEnv);
    let controller = Arc::new(ReloadController::bootstrap(opts.config_path.clone(), env)?);
    log_snapshot(&controller.current());

    let shutdown = Arc::new(Shutdown::new());
    let mut shutdown_rx = shutdown.subscribe();
    let (reload_tx, mut reload_rx) = mpsc::unbounded_channel();
    let signals = Signals::register().map_err(StartupError::Signals)?;
    let signal_task = tokio::spawn(signals::forward(signals, reload_tx, Arc::clone(&shutdown)));

    let mut watch = if opts.watch {
        Some(WatchState::start(&controller.current())?)
    } else {
        None
    };

    loop {
        let trigger = tokio::select! {
            _ = shutdown_rx.recv() => break,
            Some(()) = reload_rx.recv() => "signal",
            Some(change) = next_change(&mut watch) => {
                debug!(path = %change.path.display(), "Source changed");
                "file_change"
            }
        };
        reload(&controller, trigger, &mut watch).await;
    }

    signal_task.abort();
    info!(generation = controller.generation(), "Shutdown complete");
    Ok(())
}

/// A live watcher and its event stream.
struct WatchState {
    _watcher: RecommendedWatcher,
    changes: mpsc::UnboundedReceiver<ConfigChanged>,
}

impl WatchState {
    fn start(config: &ResolvedConfig) -> Result<Self, notify::Error> {
        let (watcher, changes) = ConfigWatcher::for_config(config);
        Ok(Self {
            _watcher: watcher.run()?,
            changes,
        })
    }
}

async fn next_change(watch: &mut Option<WatchState>) -> Option<ConfigChanged> {
    match watch {
        Some(state) => state.changes.recv().await,
        None => std::future::pending().await,
    }
}

async fn reload(controller: &Arc<ReloadController>, trigger: &'static str, watch: &mut Option<WatchState>) {
    let task = Arc::clone(controller);
    match tokio::task::spawn_blocking(move || task.reload()).await {
        Ok(Ok(config)) => {
            info!(trigger, generation = controller.generation(), "Reload applied");
            log_snapshot(&config);
            if let Some(state) = watch {
                match WatchState::start(&config) {
                    Ok(next) => *state = next,
                    Err(e) => error!(error = %e, "Failed to re-arm config watcher"),
                }
            }
        }
        Ok(Err(ReloadError::InProgress)) => debug!(trigger, "Reload already in progress, skipped"),
        // Logged with full detail by the controller.
        Ok(Err(ReloadError::Rejected(_))) => {}
        Err(e) => error!(error = %e, "Reload task failed"),
    }
}

fn log_snapshot(config: &ResolvedConfig) {
    info!(
        vhosts = config.virtual_hosts().len(),
        default = config.default_virtual_host().map(|v| v.name.as_str()).unwrap_or("-"),
        cron_jobs = config.cron_jobs().len(),
        plugins = config.plugins().len(),
        sources = config.sources().len(),
        "Active configuration"
    );
}
