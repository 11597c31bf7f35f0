pub mod builders;
pub mod fake_tool;
pub mod stores;

use std::sync::Once;
use tracing_subscriber::{fmt, EnvFilter};

pub use builders::{ReportBuilder, SettingsBuilder};
pub use fake_tool::{process_alive, FakeTool};
pub use stores::{memory_sink, FailingStore};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Run a future with a 10-second timeout.
///
/// Process tests spawn real children, so the bound is looser than a pure
/// in-memory test would need.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(10), f)
        .await
        .expect("Test timed out after 10 seconds")
}
