// Logging setup (tracing + tracing-subscriber).
//
// RUST_LOG overrides the default `info` level, e.g.
// `RUST_LOG=sales_dashboard=debug`. Logs go to stderr so they never mix
// with the report tables printed on stdout.
use tracing_subscriber::{fmt, EnvFilter};

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Verbose logging captured by the test harness.
#[cfg(test)]
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
