use std::future::Future;

use super::{make_item, make_run, make_summary, TestResult};
use crate::EstimateStorage;

pub(super) async fn run_run_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: EstimateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "runs",
            "replace_then_read_preserves_order",
            replace_then_read_preserves_order(factory).await,
        ),
        TestResult::from_result(
            "runs",
            "replace_discards_previous_items",
            replace_discards_previous_items(factory).await,
        ),
        TestResult::from_result(
            "runs",
            "empty_run_reads_back_empty",
            empty_run_reads_back_empty(factory).await,
        ),
        TestResult::from_result(
            "runs",
            "runs_are_independent",
            runs_are_independent(factory).await,
        ),
        TestResult::from_result(
            "runs",
            "summary_round_trips",
            summary_round_trips(factory).await,
        ),
        TestResult::from_result(
            "runs",
            "replace_clears_summary",
            replace_clears_summary(factory).await,
        ),
        TestResult::from_result(
            "runs",
            "get_run_returns_header",
            get_run_returns_header(factory).await,
        ),
    ]
}

// ── 1. Items come back in emission order ─────────────────────────────────────

async fn replace_then_read_preserves_order<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: EstimateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let items = vec![make_item("r1", 3, 10, 20), make_item("r1", 1, 5, 8)];
    s.replace_line_items(make_run("r1"), items.clone())
        .await
        .map_err(|e| e.to_string())?;
    let read = s.line_items("r1").await.map_err(|e| e.to_string())?;
    if read != items {
        return Err(format!("expected {:?}, got {:?}", items, read));
    }
    Ok(())
}

// ── 2. A second replace leaves only the second batch ─────────────────────────

async fn replace_discards_previous_items<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: EstimateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.replace_line_items(
        make_run("r1"),
        vec![make_item("r1", 1, 1, 2), make_item("r1", 2, 3, 4)],
    )
    .await
    .map_err(|e| e.to_string())?;
    s.replace_line_items(make_run("r1"), vec![make_item("r1", 9, 100, 200)])
        .await
        .map_err(|e| e.to_string())?;
    let read = s.line_items("r1").await.map_err(|e| e.to_string())?;
    if read.len() != 1 || read[0].node_id != 9 {
        return Err(format!("expected only node 9, got {:?}", read));
    }
    Ok(())
}

// ── 3. Recording zero items still records the run ────────────────────────────

async fn empty_run_reads_back_empty<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: EstimateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.replace_line_items(make_run("empty"), vec![])
        .await
        .map_err(|e| e.to_string())?;
    let read = s.line_items("empty").await.map_err(|e| e.to_string())?;
    if !read.is_empty() {
        return Err(format!("expected no items, got {}", read.len()));
    }
    Ok(())
}

// ── 4. Replacing one run leaves another untouched ────────────────────────────

async fn runs_are_independent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: EstimateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.replace_line_items(make_run("a"), vec![make_item("a", 1, 1, 1)])
        .await
        .map_err(|e| e.to_string())?;
    s.replace_line_items(make_run("b"), vec![make_item("b", 2, 2, 2)])
        .await
        .map_err(|e| e.to_string())?;
    s.replace_line_items(make_run("b"), vec![])
        .await
        .map_err(|e| e.to_string())?;
    let a = s.line_items("a").await.map_err(|e| e.to_string())?;
    if a.len() != 1 {
        return Err(format!("run a changed: {:?}", a));
    }
    Ok(())
}

// ── 5. Summaries are stored per run ──────────────────────────────────────────

async fn summary_round_trips<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: EstimateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.replace_line_items(make_run("r1"), vec![make_item("r1", 1, 100, 200)])
        .await
        .map_err(|e| e.to_string())?;
    let summary = make_summary("r1");
    s.save_summary(summary.clone())
        .await
        .map_err(|e| e.to_string())?;
    match s.load_summary("r1").await.map_err(|e| e.to_string())? {
        Some(read) if read == summary => Ok(()),
        other => Err(format!("expected saved summary, got {:?}", other)),
    }
}

// ── 6. Re-pricing a run invalidates its summary ──────────────────────────────

async fn replace_clears_summary<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: EstimateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.replace_line_items(make_run("r1"), vec![make_item("r1", 1, 100, 200)])
        .await
        .map_err(|e| e.to_string())?;
    s.save_summary(make_summary("r1"))
        .await
        .map_err(|e| e.to_string())?;
    s.replace_line_items(make_run("r1"), vec![make_item("r1", 1, 1, 2)])
        .await
        .map_err(|e| e.to_string())?;
    match s.load_summary("r1").await.map_err(|e| e.to_string())? {
        None => Ok(()),
        Some(stale) => Err(format!("stale summary survived replace: {:?}", stale)),
    }
}

// ── 7. The run header is readable after replace ──────────────────────────────

async fn get_run_returns_header<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: EstimateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let run = make_run("r7");
    s.replace_line_items(run.clone(), vec![])
        .await
        .map_err(|e| e.to_string())?;
    let read = s.get_run("r7").await.map_err(|e| e.to_string())?;
    if read != run {
        return Err(format!("expected {:?}, got {:?}", run, read));
    }
    Ok(())
}
