//! Storage boundary for the pricewise engine.
//!
//! The evaluator never owns persistence. It reads immutable graph, fact
//! definition and decision-tree snapshots through [`EstimateStorage`] and
//! hands emitted cost line items and run summaries back for the backend
//! to persist.

pub mod conformance;
mod error;
mod memory;
mod record;
mod traits;

pub use error::StorageError;
pub use memory::MemoryStorage;
pub use record::{CostLineItemRecord, RunRecord, RunSummaryRecord};
pub use traits::EstimateStorage;
