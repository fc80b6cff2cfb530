use std::future::Future;
use std::sync::Arc;

use super::{make_item, make_run, TestResult};
use crate::EstimateStorage;

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: EstimateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "concurrent",
            "concurrent_replacements_never_interleave",
            concurrent_replacements_never_interleave(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "concurrent_runs_all_recorded",
            concurrent_runs_all_recorded(factory).await,
        ),
    ]
}

// ── 1. Racing replacements of one run leave exactly one writer's batch ───────

async fn concurrent_replacements_never_interleave<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: EstimateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = Arc::new(factory().await);
    let mut handles = Vec::with_capacity(N);
    for writer in 0..N {
        let s = Arc::clone(&s);
        handles.push(tokio::spawn(async move {
            // Each writer's batch is tagged by node ids writer*100 + k.
            let items = (0..3)
                .map(|k| make_item("shared", (writer * 100 + k) as i64, 1, 2))
                .collect();
            s.replace_line_items(make_run("shared"), items).await
        }));
    }
    for h in handles {
        h.await
            .map_err(|e| format!("task panicked: {}", e))?
            .map_err(|e| e.to_string())?;
    }
    let items = s.line_items("shared").await.map_err(|e| e.to_string())?;
    if items.len() != 3 {
        return Err(format!("expected one batch of 3, got {}", items.len()));
    }
    let writer = items[0].node_id / 100;
    if items.iter().any(|i| i.node_id / 100 != writer) {
        return Err(format!("items from several writers: {:?}", items));
    }
    Ok(())
}

// ── 2. Distinct runs written concurrently are all visible ────────────────────

async fn concurrent_runs_all_recorded<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: EstimateStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = Arc::new(factory().await);
    let mut handles = Vec::with_capacity(N);
    for i in 0..N {
        let s = Arc::clone(&s);
        handles.push(tokio::spawn(async move {
            let run_id = format!("run-{}", i);
            let items = vec![make_item(&run_id, i as i64, 1, 2)];
            s.replace_line_items(make_run(&run_id), items).await
        }));
    }
    for h in handles {
        h.await
            .map_err(|e| format!("task panicked: {}", e))?
            .map_err(|e| e.to_string())?;
    }
    for i in 0..N {
        let items = s
            .line_items(&format!("run-{}", i))
            .await
            .map_err(|e| e.to_string())?;
        if items.len() != 1 {
            return Err(format!("run-{} has {} items", i, items.len()));
        }
    }
    Ok(())
}
