pub mod builders;
pub mod fake_backend;

use std::future::Future;
use std::sync::{Arc, Once};
use std::time::Duration;

use flowrun::fs::mock::MockFileSystem;
use flowrun::store::OutputStore;
use flowrun::types::Payload;
use serde_json::Value;
use tracing_subscriber::{fmt, EnvFilter};

pub use builders::{FlowchartBuilder, NodeBuilder};
pub use fake_backend::{FakeBackend, FakeCall};

static TRACING: Once = Once::new();

/// Install a test-writer subscriber once per test binary.
///
/// Output is captured by the harness and only shown for failing tests (or
/// with `--nocapture`). `RUST_LOG` picks the level; the default is `info`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Fail the test instead of hanging when a traversal never finishes.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("traversal did not finish within 5 seconds")
}

/// In-memory store rooted at `/results/<run_name>`, plus the filesystem
/// handle so tests can inspect or corrupt it.
pub fn mock_store(run_name: &str) -> (MockFileSystem, OutputStore) {
    let fs = MockFileSystem::new();
    let store = OutputStore::open(Arc::new(fs.clone()), "/results", run_name)
        .expect("opening mock store");
    (fs, store)
}

/// `json!({...})` -> `Payload`. Panics on non-objects.
pub fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        other => panic!("payload must be a JSON object, got {other}"),
    }
}
