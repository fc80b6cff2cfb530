use std::collections::BTreeMap;

use async_trait::async_trait;
use pricewise_interchange::{
    EstimateBundle, FactDefinitionRecord, GraphSnapshot, TreeLibrarySnapshot,
};
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::record::{CostLineItemRecord, RunRecord, RunSummaryRecord};
use crate::traits::EstimateStorage;

#[derive(Debug, Default)]
struct MemoryState {
    graphs: BTreeMap<String, GraphSnapshot>,
    fact_definitions: Vec<FactDefinitionRecord>,
    library: TreeLibrarySnapshot,
    runs: BTreeMap<String, StoredRun>,
}

#[derive(Debug)]
struct StoredRun {
    run: RunRecord,
    items: Vec<CostLineItemRecord>,
    summary: Option<RunSummaryRecord>,
}

/// In-memory storage backend.
///
/// Every read clones out of the lock, so callers always hold a private
/// copy and writers never mutate a snapshot a run is reading.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: RwLock<MemoryState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a backend with everything a bundle document carries.
    pub fn from_bundle(bundle: EstimateBundle) -> Self {
        let mut state = MemoryState::default();
        state
            .graphs
            .insert(bundle.graph.graph_id.clone(), bundle.graph);
        state.fact_definitions = bundle.fact_definitions;
        state.library = bundle.library;
        Self {
            state: RwLock::new(state),
        }
    }

    /// Store (or overwrite) a graph snapshot.
    pub async fn put_graph(&self, graph: GraphSnapshot) {
        let mut state = self.state.write().await;
        state.graphs.insert(graph.graph_id.clone(), graph);
    }

    pub async fn put_fact_definitions(&self, definitions: Vec<FactDefinitionRecord>) {
        self.state.write().await.fact_definitions = definitions;
    }

    pub async fn put_tree_library(&self, library: TreeLibrarySnapshot) {
        self.state.write().await.library = library;
    }
}

#[async_trait]
impl EstimateStorage for MemoryStorage {
    async fn load_graph(&self, graph_id: &str) -> Result<GraphSnapshot, StorageError> {
        let state = self.state.read().await;
        state
            .graphs
            .get(graph_id)
            .cloned()
            .ok_or_else(|| StorageError::GraphNotFound {
                graph_id: graph_id.to_string(),
            })
    }

    async fn load_fact_definitions(&self) -> Result<Vec<FactDefinitionRecord>, StorageError> {
        Ok(self.state.read().await.fact_definitions.clone())
    }

    async fn load_tree_library(&self) -> Result<TreeLibrarySnapshot, StorageError> {
        Ok(self.state.read().await.library.clone())
    }

    async fn replace_line_items(
        &self,
        run: RunRecord,
        items: Vec<CostLineItemRecord>,
    ) -> Result<(), StorageError> {
        if let Some(stray) = items.iter().find(|i| i.run_id != run.run_id) {
            return Err(StorageError::InvalidRecord {
                run_id: run.run_id.clone(),
                message: format!("line item carries run id '{}'", stray.run_id),
            });
        }
        let mut state = self.state.write().await;
        tracing::debug!(run_id = %run.run_id, items = items.len(), "replacing line items");
        state.runs.insert(
            run.run_id.clone(),
            StoredRun {
                run,
                items,
                summary: None,
            },
        );
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> Result<RunRecord, StorageError> {
        let state = self.state.read().await;
        state
            .runs
            .get(run_id)
            .map(|r| r.run.clone())
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.to_string(),
            })
    }

    async fn line_items(&self, run_id: &str) -> Result<Vec<CostLineItemRecord>, StorageError> {
        let state = self.state.read().await;
        state
            .runs
            .get(run_id)
            .map(|r| r.items.clone())
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.to_string(),
            })
    }

    async fn save_summary(&self, summary: RunSummaryRecord) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        let stored = state
            .runs
            .get_mut(&summary.run_id)
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: summary.run_id.clone(),
            })?;
        stored.summary = Some(summary);
        Ok(())
    }

    async fn load_summary(&self, run_id: &str) -> Result<Option<RunSummaryRecord>, StorageError> {
        let state = self.state.read().await;
        Ok(state.runs.get(run_id).and_then(|r| r.summary.clone()))
    }
}
