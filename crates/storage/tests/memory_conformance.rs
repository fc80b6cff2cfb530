//! Runs the backend-agnostic conformance suite against `MemoryStorage`.

use pricewise_storage::conformance::run_conformance_suite;
use pricewise_storage::MemoryStorage;

#[tokio::test]
async fn memory_storage_passes_conformance() {
    let report = run_conformance_suite(|| async { MemoryStorage::new() }).await;
    assert!(report.total > 0);
    assert_eq!(report.failed, 0, "{report}");
}
