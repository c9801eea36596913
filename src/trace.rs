use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize tracing once: compact fmt output, `RUST_LOG`-style filtering,
/// defaulting to `info`. Safe to call from multiple places; only the first
/// call installs the subscriber.
pub fn init() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(build_env_filter())
            .with_target(true)
            .with_level(true)
            .compact()
            .init();
    });
}

/// Run an async test body with the tracing subscriber installed.
pub async fn with_test_tracing<F, Fut, T>(_test_name: &str, f: F) -> T
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = T>,
{
    init();
    f().await
}
