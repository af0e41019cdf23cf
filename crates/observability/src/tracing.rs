//! Tracing/logging initialization.
//!
//! Engine spans carry `tenant_id`, `ledger` and `record_id` fields; the JSON
//! formatter keeps them as structured keys.

use anyhow::Context;
use tracing_subscriber::EnvFilter;

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    init_with_default("info");
}

/// Initialize with `directive` as the fallback filter.
pub fn init_with_default(directive: &str) {
    // An already-installed subscriber is the only expected failure.
    let _ = try_init(directive);
}

/// Install the JSON subscriber, reporting why it could not be installed.
pub fn try_init(default_directive: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive)
            .with_context(|| format!("invalid log filter `{default_directive}`"))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("a global tracing subscriber is already installed")
}
