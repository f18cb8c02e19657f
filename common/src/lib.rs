//! Shared utilities for the synced playout workspace.
//!
//! Provides observability (tracing setup, Prometheus metrics) and the
//! CLI colour policy used by every binary in the workspace.

pub mod cli;
pub mod observability;

pub use cli::ColorWhen;
pub use observability::{init_tracing, MetricsContext, MetricsServerConfig};
