use tracing_subscriber::filter::EnvFilter;

/// Logs to the test harness, honoring `RUST_LOG` and defaulting to
/// `adaptive_lock=trace`. Safe to call from every test.
pub fn trace_init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("adaptive_lock=trace"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
