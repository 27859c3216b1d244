//! Configuration file watcher for hot reload.
//!
//! Emits a [`ConfigChanged`] event whenever a watched file changes. Reloading is left to
//! the receiver, which owns the [`ReloadController`](crate::lifecycle::reload::ReloadController).
//!
//! # Design Decisions
//! - Directories are watched, never file inodes, so an editor that saves by
//!   renaming a temporary file over the original keeps being noticed
//! - Glob include roots are watched too; a new file matching an include
//!   pattern is a change even though no snapshot lists it yet
//! - Events are filtered against the source list and include patterns, so
//!   editor swap files and unrelated neighbours stay quiet

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use globset::GlobMatcher;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::IncludeGlob;
use crate::config::model::ResolvedConfig;

/// A file that changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChanged {
    pub path: PathBuf,
}

/// Decides which event paths concern the configuration.
struct ChangeFilter {
    sources: HashSet<PathBuf>,
    includes: Vec<GlobMatcher>,
}

impl ChangeFilter {
    fn new(sources: &[PathBuf], globs: &[IncludeGlob]) -> Self {
        let includes = globs
            .iter()
            .filter_map(|glob| match glob.matcher() {
                Ok(matcher) => Some(matcher),
                Err(e) => {
                    tracing::warn!(pattern = %glob.pattern, error = %e, "Include pattern not watched");
                    None
                }
            })
            .collect();
        Self {
            sources: sources.iter().cloned().collect(),
            includes,
        }
    }

    fn matches(&self, path: &Path) -> bool {
        self.sources.contains(path) || self.includes.iter().any(|m| m.is_match(path))
    }
}

/// Watches the directories holding every source of the current snapshot.
pub struct ConfigWatcher {
    sources: Vec<PathBuf>,
    globs: Vec<IncludeGlob>,
    change_tx: mpsc::UnboundedSender<ConfigChanged>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for change events.
    pub fn new(sources: &[PathBuf], globs: &[IncludeGlob]) -> (Self, mpsc::UnboundedReceiver<ConfigChanged>) {
        let (change_tx, change_rx) = mpsc::unbounded_channel();

        (
            Self {
                sources: sources.to_vec(),
                globs: globs.to_vec(),
                change_tx,
            },
            change_rx,
        )
    }

    /// Watch everything `config` was loaded from.
    pub fn for_config(config: &ResolvedConfig) -> (Self, mpsc::UnboundedReceiver<ConfigChanged>) {
        Self::new(config.sources(), config.include_globs())
    }

    /// Directories to watch and how deep.
    fn targets(&self) -> BTreeMap<PathBuf, RecursiveMode> {
        let mut targets = BTreeMap::new();
        for dir in self.sources.iter().filter_map(|p| p.parent()) {
            targets.entry(dir.to_path_buf()).or_insert(RecursiveMode::NonRecursive);
        }
        for glob in &self.globs {
            if !glob.root.is_dir() {
                tracing::debug!(dir = %glob.root.display(), "Include directory missing, not watched");
                continue;
            }
            let mode = targets.entry(glob.root.clone()).or_insert(RecursiveMode::NonRecursive);
            if glob.is_recursive() {
                *mode = RecursiveMode::Recursive;
            }
        }
        targets
    }

    /// Start watching. Events stop when the returned watcher is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.change_tx.clone();
        let filter = ChangeFilter::new(&self.sources, &self.globs);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove() {
                        for path in event.paths.into_iter().filter(|p| filter.matches(p)) {
                            tracing::debug!(path = %path.display(), "Config file change detected");
                            let _ = tx.send(ConfigChanged { path });
                        }
                    }
                }
                Err(e) => tracing::error!(error = %e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        let targets = self.targets();
        for (dir, mode) in &targets {
            watcher.watch(dir, *mode)?;
        }

        tracing::info!(
            files = self.sources.len(),
            directories = targets.len(),
            "Config watcher started"
        );
        Ok(watcher)
    }
}
