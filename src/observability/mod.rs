//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! config and lifecycle subsystems produce:
//!     → tracing events (include loads, publishes, rejections)
//!     → spans carrying a per-attempt UUID
//!
//! Consumers:
//!     → logging.rs subscriber (stderr, text or JSON)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Reload attempt ID flows through every event of the attempt

pub mod logging;
