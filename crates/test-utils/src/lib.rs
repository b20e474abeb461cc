pub mod builders;
pub mod script;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use rundeck::stream::{Chunk, ChunkStream};
use tracing_subscriber::{fmt, EnvFilter};

pub use builders::SettingsBuilder;
pub use script::ScriptDir;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=rundeck=debug cargo test`
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
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(10), f)
        .await
        .expect("Test timed out after 10 seconds")
}

/// Read a stream to its end.
pub async fn collect_chunks(mut stream: ChunkStream) -> Vec<Chunk> {
    with_timeout(async move {
        let mut chunks = Vec::new();
        while let Some(chunk) = stream.recv().await {
            chunks.push(chunk);
        }
        chunks
    })
    .await
}

/// Texts of `chunks`, in order.
pub fn texts(chunks: &[Chunk]) -> Vec<String> {
    chunks.iter().map(|c| c.text.to_string()).collect()
}
