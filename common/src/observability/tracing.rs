//! Tracing initialization.
//!
//! Centralizes tracing config so every binary behaves the same.

use crate::ColorWhen;
use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// - Respects `RUST_LOG` via `EnvFilter`, falling back to `default_directives`.
/// - ANSI color controlled by `ColorWhen`.
/// - Thread names are included (`tone-producer`, `null-sink-render`, ...).
pub fn init_tracing(color: ColorWhen, default_directives: &str) -> Result<()> {
    // ---
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives))
        .map_err(|e| anyhow!("invalid log directives {default_directives:?}: {e}"))?;

    fmt()
        .with_env_filter(env_filter)
        .with_ansi(color.should_color_stderr())
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("tracing already initialized: {e}"))?;

    Ok(())
}
