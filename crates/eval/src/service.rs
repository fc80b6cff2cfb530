//! Async orchestration between storage and the evaluator.
//!
//! Every call reads fresh snapshots from the backend, builds the run's
//! indexes and context, evaluates synchronously, and hands results back
//! to the backend. Nothing is shared between calls except the backend
//! itself.

use std::collections::BTreeSet;

use pricewise_interchange::GraphSnapshot;
use pricewise_storage::{
    CostLineItemRecord, EstimateStorage, RunRecord, RunSummaryRecord, StorageError,
};
use sha2::{Digest, Sha256};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::config::EngineConfig;
use crate::context::RuntimeContext;
use crate::error::{ErrorKind, EvalError};
use crate::fact::{assemble_facts, FactCatalog, FactMap};
use crate::graph::{load_graph, LoadedGraph};
use crate::page::{self, PageResult};
use crate::pricing::{self, CostLineItem, PricingRun};
use crate::report::{self, PricingReport};
use crate::tree::{TreeLibrary, TreeOutcome};
use crate::validate::{self, ValidationReport};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("failed to encode graph snapshot: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to format timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
}

impl ServiceError {
    /// Taxonomy kind, when the error belongs to one.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ServiceError::Eval(e) => Some(e.kind()),
            ServiceError::Storage(StorageError::GraphNotFound { .. })
            | ServiceError::Storage(StorageError::RunNotFound { .. }) => Some(ErrorKind::NotFound),
            ServiceError::Storage(StorageError::InvalidRecord { .. }) => Some(ErrorKind::Malformed),
            ServiceError::Storage(StorageError::Backend(_))
            | ServiceError::Encode(_)
            | ServiceError::Timestamp(_) => None,
        }
    }
}

/// Content hash of a graph snapshot, hex encoded.
pub fn graph_etag(snapshot: &GraphSnapshot) -> Result<String, serde_json::Error> {
    let canonical = serde_json::to_vec(snapshot)?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(format!("{:x}", hasher.finalize()))
}

fn now_rfc3339() -> Result<String, time::error::Format> {
    OffsetDateTime::now_utc().format(&Rfc3339)
}

pub struct EstimateService<S: EstimateStorage> {
    storage: S,
    config: EngineConfig,
}

impl<S: EstimateStorage> EstimateService<S> {
    pub fn new(storage: S, config: EngineConfig) -> Self {
        EstimateService { storage, config }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn snapshot(&self, graph_id: &str) -> Result<GraphSnapshot, ServiceError> {
        match self.storage.load_graph(graph_id).await {
            Ok(snapshot) => Ok(snapshot),
            Err(StorageError::GraphNotFound { graph_id }) => {
                Err(EvalError::GraphNotFound { graph_id }.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn load_graph(&self, graph_id: &str) -> Result<LoadedGraph, ServiceError> {
        let snapshot = self.snapshot(graph_id).await?;
        Ok(load_graph(&snapshot, self.config.entry_convention)?)
    }

    pub async fn fact_catalog(&self) -> Result<FactCatalog, ServiceError> {
        let records = self.storage.load_fact_definitions().await?;
        Ok(FactCatalog::from_records(&records))
    }

    pub async fn tree_library(&self) -> Result<TreeLibrary, ServiceError> {
        let snapshot = self.storage.load_tree_library().await?;
        Ok(TreeLibrary::from_snapshot(&snapshot))
    }

    /// Coerce raw answers against the stored fact definitions.
    pub async fn coerce_facts(&self, raw_facts: &serde_json::Value) -> Result<FactMap, ServiceError> {
        let catalog = self.fact_catalog().await?;
        Ok(assemble_facts(&catalog, raw_facts)?)
    }

    pub async fn compute_page(
        &self,
        graph_id: &str,
        raw_facts: &serde_json::Value,
        answered: &BTreeSet<i64>,
    ) -> Result<PageResult, ServiceError> {
        let graph = self.load_graph(graph_id).await?;
        let facts = self.coerce_facts(raw_facts).await?;
        Ok(page::compute_page(&graph, &facts, answered, self.config.page_size)?)
    }

    /// Price `graph_id` under `run_id` and replace whatever the run held.
    pub async fn run_pricing(
        &self,
        graph_id: &str,
        run_id: &str,
        raw_facts: &serde_json::Value,
    ) -> Result<PricingRun, ServiceError> {
        let snapshot = self.snapshot(graph_id).await?;
        let graph = load_graph(&snapshot, self.config.entry_convention)?;
        let facts = self.coerce_facts(raw_facts).await?;
        let library = self.tree_library().await?;

        let run = pricing::execute_pricing_graph(&graph, run_id, &library, facts)?;

        let record = RunRecord {
            run_id: run_id.to_string(),
            graph_id: graph_id.to_string(),
            graph_etag: graph_etag(&snapshot)?,
            recorded_at: now_rfc3339()?,
        };
        let items: Vec<CostLineItemRecord> = run.items.iter().map(Into::into).collect();
        self.storage.replace_line_items(record, items).await?;

        tracing::info!(
            run_id = %run_id,
            graph_id = %graph_id,
            items = run.items.len(),
            "pricing run recorded"
        );
        Ok(run)
    }

    /// Build the report of a recorded run and save its summary.
    pub async fn build_report(&self, run_id: &str) -> Result<PricingReport, ServiceError> {
        let run = self.storage.get_run(run_id).await?;
        let items = self
            .storage
            .line_items(run_id)
            .await?
            .iter()
            .map(CostLineItem::from_record)
            .collect::<Result<Vec<_>, _>>()?;

        let report = report::build_report(run_id, items, &self.config.tiers)?;

        self.storage
            .save_summary(RunSummaryRecord {
                run_id: run_id.to_string(),
                graph_id: run.graph_id,
                total_min: report.total_min,
                total_max: report.total_max,
                tier_name: report.tier.name.clone(),
                tier_label: report.tier.label.clone(),
                item_count: report.items.len(),
                graph_etag: run.graph_etag,
                computed_at: now_rfc3339()?,
            })
            .await?;

        tracing::info!(
            run_id = %run_id,
            total_min = %report.total_min,
            total_max = %report.total_max,
            tier = %report.tier.name,
            "report built"
        );
        Ok(report)
    }

    pub async fn evaluate_tree(
        &self,
        tree_id: i64,
        raw_facts: &serde_json::Value,
    ) -> Result<TreeOutcome, ServiceError> {
        let library = self.tree_library().await?;
        let facts = self.coerce_facts(raw_facts).await?;
        Ok(RuntimeContext::new(&library, facts).evaluate_tree_outcome(tree_id)?)
    }

    /// Structural report over the graph and the tree library.
    ///
    /// A graph that cannot be loaded at all is reported as an error entry
    /// rather than raised; a missing graph is still raised. Broken trees
    /// and expressions are reported one by one.
    pub async fn validate(&self, graph_id: &str) -> Result<ValidationReport, ServiceError> {
        let snapshot = self.snapshot(graph_id).await?;
        let graph_report = match load_graph(&snapshot, self.config.entry_convention) {
            Ok(graph) => validate::validate_graph_structure(&graph),
            Err(e) => ValidationReport::error(e.to_string()),
        };

        let library = self.tree_library().await?;
        let tree_report = validate::validate_trees(&library);

        let report = graph_report.merge(tree_report);
        for warning in &report.warnings {
            tracing::warn!(graph_id = %graph_id, "{}", warning);
        }
        Ok(report)
    }
}
