use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Header of a pricing run: which graph was priced and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub graph_id: String,
    /// Content hash of the graph snapshot the run was priced against.
    pub graph_etag: String,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub recorded_at: String,
}

/// A costed line item emitted by a pricing run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostLineItemRecord {
    pub run_id: String,
    /// Primary key of the pricing node that emitted the item.
    pub node_id: i64,
    pub category: String,
    pub label: String,
    pub min_cost: Decimal,
    pub max_cost: Decimal,
    pub explanation: String,
    /// Facts the node read while deciding and pricing, keyed by fact key.
    pub applied_facts: serde_json::Value,
}

/// Aggregate summary of a pricing run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummaryRecord {
    pub run_id: String,
    pub graph_id: String,
    pub total_min: Decimal,
    pub total_max: Decimal,
    pub tier_name: String,
    pub tier_label: String,
    pub item_count: usize,
    /// Content hash of the graph snapshot the run was priced against.
    pub graph_etag: String,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub computed_at: String,
}
