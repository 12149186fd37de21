use log::enable_logging;
use profiling::start_tracing;

pub mod log;
pub mod profiling;

/// Installs the global subscriber. Keep the guard alive until the program exits,
/// dropping it flushes the chrome trace file.
pub fn setup_debugging() -> profiling::FlushGuard {
    #[cfg(debug_assertions)]
    std::env::set_var("RUST_BACKTRACE", "1");

    let guard = start_tracing();

    enable_logging();
    guard
}
