//! Configuration resolution and validation for a multi-tenant app server.
//!
//! Loads a root document with its includes, interpolates environment
//! variables, normalizes sizes, durations and rates, cascades global
//! settings into each virtual host, validates the result and publishes it
//! as an immutable snapshot that can be hot-reloaded.

pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::{load_config, load_config_with, ConfigError, ResolvedConfig};
pub use lifecycle::{ReloadController, Shutdown};
