//! Configuration resolution subsystem.
//!
//! # Data Flow
//! ```text
//! root document (JSON/TOML)
//!     → loader.rs (parse, expand includes, detect cycles)
//!     → interpolate.rs (${VAR} / ${VAR:-default})
//!     → quantity.rs (sizes, durations, rates → canonical units)
//!     → schema.rs (typed RawConfig, every leaf Optional)
//!     → merge.rs (vhost → global → built-in cascade)
//!     → validation.rs (collect every violation)
//!     → ResolvedConfig (immutable, shared via Arc)
//!
//! On reload:
//!     watcher.rs / SIGHUP
//!     → lifecycle::reload runs the same pipeline
//!     → atomic swap of Arc<ResolvedConfig>, or rejection
//! ```
//!
//! # Design Decisions
//! - Config is immutable once resolved; changes require a full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod error;
pub mod interpolate;
pub mod loader;
pub mod merge;
pub mod model;
pub mod pipeline;
pub mod quantity;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use error::{ConfigError, ConfigResult, Diagnostic, Violation, ViolationKind};
pub use interpolate::{EnvSource, ProcessEnv};
pub use loader::DocumentFormat;
pub use model::{LookupError, Origin, ResolvedConfig, VirtualHost};
pub use pipeline::{load_config, load_config_str, load_config_with};
pub use schema::RawConfig;
