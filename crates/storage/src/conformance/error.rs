use std::future::Future;

use super::{make_item, make_run, make_summary, TestResult};
use crate::{EstimateStorage, StorageError};

pub(super) async fn run_error_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: EstimateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "error",
            "load_graph_nonexistent",
            load_graph_nonexistent(factory).await,
        ),
        TestResult::from_result(
            "error",
            "line_items_nonexistent_run",
            line_items_nonexistent_run(factory).await,
        ),
        TestResult::from_result(
            "error",
            "get_run_nonexistent",
            get_run_nonexistent(factory).await,
        ),
        TestResult::from_result(
            "error",
            "save_summary_for_unknown_run",
            save_summary_for_unknown_run(factory).await,
        ),
        TestResult::from_result(
            "error",
            "load_summary_for_unknown_run_is_none",
            load_summary_for_unknown_run_is_none(factory).await,
        ),
        TestResult::from_result(
            "error",
            "replace_rejects_foreign_items",
            replace_rejects_foreign_items(factory).await,
        ),
    ]
}

// ── 1. load_graph on empty store returns GraphNotFound with the id ───────────

async fn load_graph_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: EstimateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.load_graph("graph-404").await {
        Err(StorageError::GraphNotFound { graph_id }) if graph_id == "graph-404" => Ok(()),
        other => Err(format!("expected GraphNotFound(graph-404), got {:?}", other)),
    }
}

// ── 2. line_items for an unrecorded run returns RunNotFound ──────────────────

async fn line_items_nonexistent_run<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: EstimateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.line_items("run-404").await {
        Err(StorageError::RunNotFound { run_id }) if run_id == "run-404" => Ok(()),
        other => Err(format!("expected RunNotFound(run-404), got {:?}", other)),
    }
}

// ── 3. get_run for an unrecorded run returns RunNotFound ─────────────────────

async fn get_run_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: EstimateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_run("run-404").await {
        Err(StorageError::RunNotFound { .. }) => Ok(()),
        other => Err(format!("expected RunNotFound, got {:?}", other)),
    }
}

// ── 4. A summary cannot be attached to a run that does not exist ─────────────

async fn save_summary_for_unknown_run<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: EstimateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.save_summary(make_summary("ghost")).await {
        Err(StorageError::RunNotFound { run_id }) if run_id == "ghost" => Ok(()),
        other => Err(format!("expected RunNotFound(ghost), got {:?}", other)),
    }
}

// ── 5. load_summary is not an error for unknown runs ─────────────────────────

async fn load_summary_for_unknown_run_is_none<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: EstimateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.load_summary("ghost").await {
        Ok(None) => Ok(()),
        other => Err(format!("expected Ok(None), got {:?}", other)),
    }
}

// ── 6. Items carrying another run id are rejected and nothing is stored ──────

async fn replace_rejects_foreign_items<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: EstimateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let result = s
        .replace_line_items(
            make_run("r1"),
            vec![make_item("r1", 1, 1, 2), make_item("other", 2, 3, 4)],
        )
        .await;
    if !matches!(result, Err(StorageError::InvalidRecord { .. })) {
        return Err(format!("expected InvalidRecord, got {:?}", result));
    }
    match s.line_items("r1").await {
        Err(StorageError::RunNotFound { .. }) => Ok(()),
        other => Err(format!("rejected replace left data behind: {:?}", other)),
    }
}
