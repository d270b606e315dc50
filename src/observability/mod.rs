//! Observability module providing structured logging.
//!
//! The subscriber is configured from `[observability.logging]`, with `RUST_LOG`
//! taking precedence over the configured filter.

mod tracing_init;

pub use tracing_init::*;
