use std::sync::Once;

/// Install the global tracing subscriber. Call once from the host before
/// creating the coordinator; later calls are ignored.
///
/// `RUST_LOG` wins over `default_filter`.
pub fn init_logging(default_filter: &str) {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .or_else(|_| tracing_subscriber::EnvFilter::try_new(default_filter))
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("huddle_core=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .try_init();
    });
}
