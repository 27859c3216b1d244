//! Hot reload of the published configuration.
//!
//! # Responsibilities
//! - Own the current [`ResolvedConfig`] snapshot
//! - Run one reload attempt at a time through the full pipeline
//! - Publish a new snapshot atomically, or keep the old one
//!
//! # Design Decisions
//! - Readers load the snapshot lock-free via `ArcSwap`
//! - Reject-while-busy: a second attempt fails with [`ReloadError::InProgress`]
//! - A snapshot is published only after it has been fully validated
//! - Old snapshots live as long as someone holds their `Arc`

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::config::error::{ConfigError, ConfigResult};
use crate::config::interpolate::EnvSource;
use crate::config::loader::{load_document, load_document_str, DocumentFormat, LoadedDocument};
use crate::config::model::ResolvedConfig;
use crate::config::pipeline::prepare;

/// Where the controller is in a reload attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadState {
    Idle,
    Loading,
    Validating,
    Publishing,
    Rejecting,
}

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("a reload is already in progress")]
    InProgress,

    #[error("reload rejected: {0}")]
    Rejected(#[from] ConfigError),
}

impl ReloadError {
    /// The underlying configuration error, if the attempt got that far.
    pub fn config_error(&self) -> Option<&ConfigError> {
        match self {
            ReloadError::InProgress => None,
            ReloadError::Rejected(e) => Some(e),
        }
    }
}

/// Where the next document comes from.
enum Source<'a> {
    Root,
    File(&'a Path),
    Inline {
        content: &'a str,
        format: DocumentFormat,
        base_dir: &'a Path,
    },
}

/// Owns the published snapshot and serializes reloads.
pub struct ReloadController {
    current: ArcSwap<ResolvedConfig>,
    root: Mutex<PathBuf>,
    env: Arc<dyn EnvSource>,
    state: Mutex<ReloadState>,
    generation: AtomicU64,
}

impl ReloadController {
    /// Load the initial snapshot from `path`.
    ///
    /// There is nothing to fall back on, so callers treat an error as fatal.
    pub fn bootstrap(path: impl Into<PathBuf>, env: Arc<dyn EnvSource>) -> ConfigResult<Self> {
        let root = path.into();
        let attempt = Uuid::new_v4();
        let span = info_span!("config_bootstrap", attempt_id = %attempt, path = %root.display());
        let _enter = span.enter();

        let config = prepare(load_document(&root)?, env.as_ref())?.validate()?;
        info!(vhosts = config.virtual_hosts().len(), "Initial configuration loaded");

        Ok(Self {
            current: ArcSwap::from_pointee(config),
            root: Mutex::new(root),
            env,
            state: Mutex::new(ReloadState::Idle),
            generation: AtomicU64::new(1),
        })
    }

    /// The current snapshot. Never blocks.
    pub fn current(&self) -> Arc<ResolvedConfig> {
        self.current.load_full()
    }

    pub fn state(&self) -> ReloadState {
        *lock(&self.state)
    }

    /// Number of snapshots published so far, counting the initial one.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Path of the root document reloads read from.
    pub fn root_path(&self) -> PathBuf {
        lock(&self.root).clone()
    }

    /// Re-read the root document.
    pub fn reload(&self) -> Result<Arc<ResolvedConfig>, ReloadError> {
        self.attempt(Source::Root)
    }

    /// Load from a new root document. On success it becomes the root for
    /// later [`reload`](Self::reload) calls.
    pub fn reload_from(&self, path: &Path) -> Result<Arc<ResolvedConfig>, ReloadError> {
        self.attempt(Source::File(path))
    }

    /// Load from an in-memory document. Includes resolve against `base_dir`.
    pub fn reload_from_str(
        &self,
        content: &str,
        format: DocumentFormat,
        base_dir: &Path,
    ) -> Result<Arc<ResolvedConfig>, ReloadError> {
        self.attempt(Source::Inline {
            content,
            format,
            base_dir,
        })
    }

    fn attempt(&self, source: Source<'_>) -> Result<Arc<ResolvedConfig>, ReloadError> {
        let mut run = Attempt::begin(&self.state).ok_or(ReloadError::InProgress)?;

        let attempt = Uuid::new_v4();
        let span = info_span!("config_reload", attempt_id = %attempt);
        let _enter = span.enter();

        match self.run(&mut run, &source) {
            Ok(config) => {
                run.enter(ReloadState::Publishing);
                self.current.store(Arc::clone(&config));
                if let Source::File(path) = source {
                    *lock(&self.root) = path.to_path_buf();
                }
                let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
                info!(generation, vhosts = config.virtual_hosts().len(), "Configuration published");
                Ok(config)
            }
            Err(e) => {
                run.enter(ReloadState::Rejecting);
                warn!(
                    error = %e,
                    problems = e.diagnostics().len(),
                    "Configuration rejected, keeping current snapshot"
                );
                Err(ReloadError::Rejected(e))
            }
        }
    }

    fn run(&self, run: &mut Attempt<'_>, source: &Source<'_>) -> ConfigResult<Arc<ResolvedConfig>> {
        run.enter(ReloadState::Loading);
        let doc: LoadedDocument = match source {
            Source::Root => load_document(&self.root_path())?,
            Source::File(path) => load_document(path)?,
            Source::Inline {
                content,
                format,
                base_dir,
            } => load_document_str(content, *format, base_dir)?,
        };
        let prepared = prepare(doc, self.env.as_ref())?;

        run.enter(ReloadState::Validating);
        Ok(Arc::new(prepared.validate()?))
    }
}

/// Holds the attempt slot; returns the controller to `Idle` when dropped.
struct Attempt<'a> {
    state: &'a Mutex<ReloadState>,
}

impl<'a> Attempt<'a> {
    fn begin(state: &'a Mutex<ReloadState>) -> Option<Self> {
        let mut current = lock(state);
        if *current != ReloadState::Idle {
            return None;
        }
        *current = ReloadState::Loading;
        Some(Self { state })
    }

    fn enter(&mut self, next: ReloadState) {
        *lock(self.state) = next;
    }
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        *lock(self.state) = ReloadState::Idle;
    }
}

/// A panicked attempt leaves nothing half-written behind the lock.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;

    fn controller(content: &str) -> (tempfile::TempDir, ReloadController) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, content).unwrap();
        let env: Arc<dyn EnvSource> = Arc::new(HashMap::<String, String>::new());
        let controller = ReloadController::bootstrap(&path, env).unwrap();
        (dir, controller)
    }

    #[test]
    fn test_bootstrap_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let env: Arc<dyn EnvSource> = Arc::new(HashMap::<String, String>::new());
        let err = ReloadController::bootstrap(dir.path().join("missing.json"), env).err().unwrap();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_reload_publishes_new_snapshot() {
        let (dir, controller) = controller(r#"{ "limits": { "requests_per_second": 10 } }"#);
        assert_eq!(controller.generation(), 1);

        fs::write(dir.path().join("config.json"), r#"{ "limits": { "requests_per_second": 20 } }"#).unwrap();
        let config = controller.reload().unwrap();

        assert_eq!(config.global_limits().requests_per_second, 20);
        assert_eq!(controller.current().global_limits().requests_per_second, 20);
        assert_eq!(controller.generation(), 2);
        assert_eq!(controller.state(), ReloadState::Idle);
    }

    #[test]
    fn test_rejected_reload_keeps_snapshot() {
        let (_dir, controller) = controller(r#"{ "logging": { "level": "info" } }"#);
        let before = controller.current();

        let err = controller
            .reload_from_str(r#"{ "logging": { "level": "loud" } }"#, DocumentFormat::Json, Path::new("."))
            .unwrap_err();

        assert_eq!(err.config_error().unwrap().violations().len(), 1);
        assert!(Arc::ptr_eq(&before, &controller.current()));
        assert_eq!(controller.generation(), 1);
        assert_eq!(controller.state(), ReloadState::Idle);
    }

    #[test]
    fn test_reload_from_switches_root() {
        let (dir, controller) = controller("{}");
        let other = dir.path().join("other.json");
        fs::write(&other, r#"{ "server": { "port": 9000 } }"#).unwrap();

        controller.reload_from(&other).unwrap();
        assert_eq!(controller.root_path(), other);
        assert_eq!(controller.reload().unwrap().server().port, 9000);
    }

    #[test]
    fn test_busy_controller_rejects_attempt() {
        let (_dir, controller) = controller("{}");
        let _held = Attempt::begin(&controller.state).unwrap();

        assert!(matches!(controller.reload(), Err(ReloadError::InProgress)));
        assert_eq!(controller.state(), ReloadState::Loading);
    }
}
