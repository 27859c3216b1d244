//! Error taxonomy for configuration resolution.
//!
//! Loader, interpolation, quantity and decode failures are singular and stop
//! the pipeline. Validation failures are collected and reported together.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::config::quantity::QuantityError;

/// Errors that void a load attempt.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A document could not be read.
    #[error("IO error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A document is malformed, or does not match the schema.
    #[error("syntax error in {path}: {message}")]
    Syntax { path: String, message: String },

    /// An include is reachable from itself.
    #[error("include cycle: {}", display_chain(.chain))]
    IncludeCycle { chain: Vec<PathBuf> },

    /// Include nesting went past the limit.
    #[error("include depth exceeded {max} at {}", .path.display())]
    IncludeDepthExceeded { path: PathBuf, max: usize },

    /// An interpolation token names an unset variable and has no default.
    #[error("undefined variable '{variable}' referenced by {field}")]
    Reference { field: String, variable: String },

    /// A size, duration or rate string could not be parsed.
    #[error("{field}: {source}")]
    QuantityParse {
        field: String,
        #[source]
        source: QuantityError,
    },

    /// A bounded collection was exceeded while loading documents.
    #[error("{field}: {len} entries exceed capacity {max}")]
    Capacity { field: String, len: usize, max: usize },

    /// The resolved configuration broke one or more rules.
    #[error("validation failed: {}", display_violations(.0))]
    Validation(Vec<Violation>),
}

/// Convenience alias used throughout the config subsystem.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// One entry of a structured error report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub path: String,
    pub message: String,
}

impl ConfigError {
    /// Flatten into `(path, message)` pairs, one per violation.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let single = |path: String| {
            vec![Diagnostic {
                path,
                message: self.to_string(),
            }]
        };
        match self {
            ConfigError::Validation(violations) => violations
                .iter()
                .map(|v| Diagnostic {
                    path: v.field.clone(),
                    message: v.kind.to_string(),
                })
                .collect(),
            ConfigError::Io { path, .. } | ConfigError::IncludeDepthExceeded { path, .. } => {
                single(path.display().to_string())
            }
            ConfigError::IncludeCycle { chain } => {
                single(chain.first().map(|p| p.display().to_string()).unwrap_or_default())
            }
            ConfigError::Syntax { path, .. } => single(path.clone()),
            ConfigError::Reference { field, .. }
            | ConfigError::QuantityParse { field, .. }
            | ConfigError::Capacity { field, .. } => single(field.clone()),
        }
    }

    /// The violations of a validation failure, empty for any other error.
    pub fn violations(&self) -> &[Violation] {
        match self {
            ConfigError::Validation(v) => v,
            _ => &[],
        }
    }
}

/// A single rule broken by the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Dotted field path, e.g. `vhosts[2].security.cors.allowed_origins`.
    pub field: String,
    pub kind: ViolationKind,
}

impl Violation {
    pub fn new(field: impl Into<String>, kind: ViolationKind) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationKind {
    #[error("{len} entries exceed capacity {max}")]
    Capacity { len: usize, max: usize },

    #[error("{value} is out of range: {expected}")]
    Range { value: String, expected: String },

    #[error("'{value}' is not one of: {}", .allowed.join(", "))]
    Enum { value: String, allowed: Vec<String> },

    #[error("cannot be combined with {other}")]
    MutualExclusion { other: String },

    #[error("'{value}' is already used by {first}")]
    Uniqueness { value: String, first: String },

    #[error("unknown {target} '{value}'")]
    Referential { target: String, value: String },
}

fn display_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn display_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(Violation::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_diagnostics_are_per_violation() {
        let err = ConfigError::Validation(vec![
            Violation::new("server.port", ViolationKind::Range {
                value: "0".into(),
                expected: "1..=65535".into(),
            }),
            Violation::new("logging.level", ViolationKind::Enum {
                value: "loud".into(),
                allowed: vec!["debug".into(), "info".into()],
            }),
        ]);

        let diags = err.diagnostics();
        assert_eq!(diags.len(), 2);
        assert_eq!(diags[0].path, "server.port");
        assert_eq!(diags[1].message, "'loud' is not one of: debug, info");
        assert_eq!(err.violations().len(), 2);
    }

    #[test]
    fn test_cycle_display() {
        let err = ConfigError::IncludeCycle {
            chain: vec!["a.json".into(), "b.json".into(), "a.json".into()],
        };
        assert_eq!(err.to_string(), "include cycle: a.json -> b.json -> a.json");
        assert_eq!(err.diagnostics()[0].path, "a.json");
    }
}
