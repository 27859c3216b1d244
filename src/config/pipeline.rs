//! End-to-end resolution: document → validated snapshot.
//!
//! Stages run in a fixed order and the first singular failure stops the
//! attempt. Validation is the only stage that reports several problems.

use std::path::Path;

use tracing::debug;

use crate::config::error::{ConfigError, ConfigResult};
use crate::config::interpolate::{interpolate_document, EnvSource, ProcessEnv};
use crate::config::loader::{load_document, load_document_str, DocumentFormat, LoadedDocument};
use crate::config::merge::resolve;
use crate::config::model::ResolvedConfig;
use crate::config::quantity::normalize_document;
use crate::config::schema::RawConfig;
use crate::config::validation::validate;

/// Load, resolve and validate the document at `path` using the process environment.
pub fn load_config(path: &Path) -> ConfigResult<ResolvedConfig> {
    load_config_with(path, &ProcessEnv)
}

/// Like [`load_config`] with an explicit environment.
pub fn load_config_with(path: &Path, env: &dyn EnvSource) -> ConfigResult<ResolvedConfig> {
    resolve_document(load_document(path)?, env)
}

/// Resolve an in-memory document. Includes resolve against `base_dir`.
pub fn load_config_str(
    content: &str,
    format: DocumentFormat,
    base_dir: &Path,
    env: &dyn EnvSource,
) -> ConfigResult<ResolvedConfig> {
    resolve_document(load_document_str(content, format, base_dir)?, env)
}

/// Run every stage after loading.
pub fn resolve_document(doc: LoadedDocument, env: &dyn EnvSource) -> ConfigResult<ResolvedConfig> {
    prepare(doc, env)?.validate()
}

/// A resolved document that has not been validated yet.
pub(crate) struct Prepared {
    raw: RawConfig,
    resolved: ResolvedConfig,
}

/// Interpolate, normalize, decode and cascade a loaded document.
pub(crate) fn prepare(doc: LoadedDocument, env: &dyn EnvSource) -> ConfigResult<Prepared> {
    let LoadedDocument {
        mut root,
        sources,
        include_globs,
    } = doc;

    interpolate_document(&mut root, env)?;
    normalize_document(&mut root)?;
    let raw = RawConfig::from_value(root)?;
    let resolved = resolve(&raw, sources).with_include_globs(include_globs);

    Ok(Prepared { raw, resolved })
}

impl Prepared {
    pub(crate) fn validate(self) -> ConfigResult<ResolvedConfig> {
        validate(&self.raw, &self.resolved).map_err(ConfigError::Validation)?;

        debug!(
            vhosts = self.resolved.virtual_hosts().len(),
            sources = self.resolved.sources().len(),
            "Configuration resolved"
        );
        Ok(self.resolved)
    }
}
