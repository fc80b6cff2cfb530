//! Typed structs representing persisted estimation snapshots.
//!
//! These records mirror what the surrounding application stores. Fields
//! whose interpretation belongs to the evaluator (condition trees, node
//! configuration, literal values) are stored as `serde_json::Value`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ── Graph ───────────────────────────────────────────────────────────

/// A decision or pricing graph as persisted: flat node and edge lists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphSnapshot {
    pub graph_id: String,
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub edges: Vec<EdgeRecord>,
}

/// A single graph node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeRecord {
    /// Primary key used by edges.
    pub id: i64,
    /// External key chosen by the graph author.
    pub node_id: String,
    /// `"question"` or `"cost"`. Kept raw; the loader rejects anything else.
    pub node_type: String,
    #[serde(default)]
    pub label: String,
    /// Type-specific payload: `visibility_rules` for questions, pricing
    /// configuration for cost nodes.
    #[serde(default)]
    pub config: serde_json::Value,
}

/// A directed edge between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EdgeRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub from_node_id: i64,
    pub to_node_id: i64,
    /// Condition tree; null or `{}` means always satisfied.
    #[serde(default)]
    pub edge_condition: serde_json::Value,
    #[serde(default)]
    pub execution_priority: i64,
}

// ── Facts ───────────────────────────────────────────────────────────

/// Declared type of a fact key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FactDefinitionRecord {
    pub fact_key: String,
    /// `boolean`, `number`, `string` or `enum`. Kept raw so that coercion
    /// can report an unsupported type instead of failing deserialization.
    pub fact_type: String,
    /// Allowed values for enum facts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

// ── Decision trees ──────────────────────────────────────────────────

/// An if-tree: ordered, condition-guarded branches with typed returns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionTreeRecord {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub branches: Vec<BranchRecord>,
}

/// One branch of a decision tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BranchRecord {
    pub order_index: i64,
    /// Absent means the branch is unconditional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_expression_id: Option<i64>,
    pub returns: ReturnRecord,
}

/// The return owned by a branch.
///
/// `kind` is one of `number`, `boolean` or `adjustment`; the evaluator
/// rejects anything else.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReturnRecord {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_expression_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub adjustments: Vec<AdjustmentRecord>,
}

/// One step of an adjustment return.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdjustmentRecord {
    pub order_index: i64,
    /// `+`, `-`, `*` or `/`.
    pub operation: String,
    pub value_expression_id: i64,
    /// Cost bucket used when a scalar meets a cost breakdown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
}

/// A stored expression node. Children are referenced by id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpressionRecord {
    pub id: i64,
    /// Operator or leaf kind (`number`, `fact`, `+`, `>`, `and`, ...).
    pub op: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_child_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_child_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub literal: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub var_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fact_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
}

/// Decision trees, their expression nodes and the variables bound to them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TreeLibrarySnapshot {
    #[serde(default)]
    pub trees: Vec<DecisionTreeRecord>,
    #[serde(default)]
    pub expressions: Vec<ExpressionRecord>,
    /// Maps a variable key to the decision tree that computes it.
    #[serde(default)]
    pub variable_bindings: BTreeMap<String, i64>,
}

// ── Bundle ──────────────────────────────────────────────────────────

/// Everything one evaluation needs, as a single document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EstimateBundle {
    pub graph: GraphSnapshot,
    #[serde(default)]
    pub fact_definitions: Vec<FactDefinitionRecord>,
    #[serde(flatten)]
    pub library: TreeLibrarySnapshot,
}
