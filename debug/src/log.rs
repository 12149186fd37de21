use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Logs go through the layered subscriber installed by `start_tracing`.
#[cfg(feature = "tracing-core")]
pub fn enable_logging() {}

/// Plain formatted logs, filtered through `RUST_LOG`.
#[cfg(not(feature = "tracing-core"))]
pub fn enable_logging() {
    // A host may have installed its own subscriber already
    let _ = tracing_subscriber::fmt()
        .with_env_filter(default_filter())
        .try_init();
}

pub fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}
