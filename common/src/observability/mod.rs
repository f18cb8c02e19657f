//! Playout observability: `tracing` subscriber setup and the Prometheus
//! registry served on `/metrics`.

mod metrics;
mod tracing;

pub use self::metrics::{MetricsContext, MetricsServerConfig};
pub use self::tracing::init_tracing;
