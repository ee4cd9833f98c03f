//! Log output setup for binaries and tests embedding the estimator

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "fermi_estimator=info,fermi_guardrail=info,fermi_store=warn";

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a stderr subscriber honouring `RUST_LOG`
///
/// Fails if a global subscriber is already set.
pub fn try_init_tracing() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter())
        .try_init()
        .map_err(|e| format!("Failed to initialize tracing: {}", e))
}

/// Like [`try_init_tracing`], ignoring an already-installed subscriber
pub fn init_tracing() {
    let _ = try_init_tracing();
}
