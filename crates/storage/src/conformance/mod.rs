//! Conformance test suite for `EstimateStorage` implementations.
//!
//! This module provides a backend-agnostic test suite that any
//! `EstimateStorage` implementation can run to verify correctness. The
//! suite covers:
//!
//! - **Runs**: replacement semantics, emission order, summaries
//! - **Error handling**: correct error variants for missing graphs and runs
//! - **Concurrency**: concurrent replacements never interleave items
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use pricewise_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn postgres_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_postgres_storage().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod concurrent;
mod error;
mod runs;

use std::fmt;
use std::future::Future;

use rust_decimal::Decimal;

use crate::record::{CostLineItemRecord, RunRecord, RunSummaryRecord};
use crate::EstimateStorage;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "runs", "error").
    pub category: String,
    /// Test name (e.g. "replace_discards_previous_items").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        let (passed, message) = match result {
            Ok(()) => (true, None),
            Err(msg) => (false, Some(msg)),
        };
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed,
            message,
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: EstimateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(runs::run_run_tests(&factory).await);
    results.extend(error::run_error_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: record constructors with sensible defaults ──────────────────────

fn make_run(run_id: &str) -> RunRecord {
    RunRecord {
        run_id: run_id.to_string(),
        graph_id: "test-graph".to_string(),
        graph_etag: "etag".to_string(),
        recorded_at: "2025-01-01T00:00:00Z".to_string(),
    }
}

fn make_item(run_id: &str, node_id: i64, min: i64, max: i64) -> CostLineItemRecord {
    CostLineItemRecord {
        run_id: run_id.to_string(),
        node_id,
        category: "Labor".to_string(),
        label: format!("node {}", node_id),
        min_cost: Decimal::from(min),
        max_cost: Decimal::from(max),
        explanation: String::new(),
        applied_facts: serde_json::json!({ "sqft": "1500" }),
    }
}

fn make_summary(run_id: &str) -> RunSummaryRecord {
    RunSummaryRecord {
        run_id: run_id.to_string(),
        graph_id: "test-graph".to_string(),
        total_min: Decimal::from(150),
        total_max: Decimal::from(280),
        tier_name: "low".to_string(),
        tier_label: "Tier 1".to_string(),
        item_count: 2,
        graph_etag: "etag".to_string(),
        computed_at: "2025-01-01T00:01:00Z".to_string(),
    }
}
