//! Logging setup.

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Build the filter from `RUST_LOG`, falling back to `default_level`.
pub fn env_filter(default_level: &str) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .with_context(|| format!("invalid log filter: {default_level}"))
}

/// Install the global subscriber.
///
/// Fails instead of panicking when a subscriber is already installed.
pub fn init_logging(default_level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter(default_level)?)
        .with(fmt::layer().with_thread_names(true))
        .try_init()
        .context("a global tracing subscriber is already installed")
}
