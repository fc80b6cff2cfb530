use async_trait::async_trait;
use pricewise_interchange::{FactDefinitionRecord, GraphSnapshot, TreeLibrarySnapshot};

use crate::error::StorageError;
use crate::record::{CostLineItemRecord, RunRecord, RunSummaryRecord};

/// The storage trait for pricewise backends.
///
/// Reads return owned snapshots. A backend that caches graphs across
/// requests must hand out copies (or immutable shared values): a run in
/// progress never observes a graph being edited.
///
/// ## Run replacement
///
/// `replace_line_items` is the only write path for line items. It
/// replaces everything previously stored for the run id in one step, so
/// re-pricing a run never leaves a mix of old and new items visible.
/// Replacing a run also discards its stored summary, which no longer
/// describes the new items.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` so one backend can
/// serve many concurrent runs.
#[async_trait]
pub trait EstimateStorage: Send + Sync + 'static {
    // ── Snapshot reads ────────────────────────────────────────────────────────

    /// Load a graph snapshot by identifier.
    ///
    /// Returns `Err(StorageError::GraphNotFound)` if no graph is stored under it.
    async fn load_graph(&self, graph_id: &str) -> Result<GraphSnapshot, StorageError>;

    /// Load the tenant's fact definitions.
    async fn load_fact_definitions(&self) -> Result<Vec<FactDefinitionRecord>, StorageError>;

    /// Load decision trees, their expression nodes and variable bindings.
    async fn load_tree_library(&self) -> Result<TreeLibrarySnapshot, StorageError>;

    // ── Run results ───────────────────────────────────────────────────────────

    /// Atomically replace all line items recorded for `run.run_id`.
    ///
    /// Every item must carry `run.run_id`; otherwise the backend returns
    /// `Err(StorageError::InvalidRecord)` and stores nothing.
    async fn replace_line_items(
        &self,
        run: RunRecord,
        items: Vec<CostLineItemRecord>,
    ) -> Result<(), StorageError>;

    /// Read the run header.
    ///
    /// Returns `Err(StorageError::RunNotFound)` if the run was never recorded.
    async fn get_run(&self, run_id: &str) -> Result<RunRecord, StorageError>;

    /// Read the line items of a run in emission order.
    ///
    /// Returns `Err(StorageError::RunNotFound)` if the run was never recorded.
    /// A recorded run with zero items returns an empty list.
    async fn line_items(&self, run_id: &str) -> Result<Vec<CostLineItemRecord>, StorageError>;

    /// Store (or overwrite) the summary of a recorded run.
    ///
    /// Returns `Err(StorageError::RunNotFound)` if the run was never recorded.
    async fn save_summary(&self, summary: RunSummaryRecord) -> Result<(), StorageError>;

    /// Read the summary of a run, if one has been saved since its last replacement.
    async fn load_summary(&self, run_id: &str) -> Result<Option<RunSummaryRecord>, StorageError>;
}
