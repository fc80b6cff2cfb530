//! Graph loading and indexing.
//!
//! A [`LoadedGraph`] is a read-only index over one persisted graph
//! snapshot: nodes by id, edges by source and by destination, and the
//! entry set. Node and edge payloads are parsed into typed form here, so
//! every malformed condition or pricing configuration is reported once,
//! at load time.

use std::collections::BTreeMap;

use pricewise_interchange::{EdgeRecord, GraphSnapshot, NodeRecord};
use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::error::EvalError;
use crate::pricing::PricingNodeConfig;

/// How entry nodes are recognized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryConvention {
    /// Nodes with no incoming edges.
    #[default]
    NoIncomingEdges,
    /// Nodes whose config carries `"is_entry": true`.
    ExplicitFlag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Question,
    Cost,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeConfig {
    Question { visibility: Condition },
    Pricing(PricingNodeConfig),
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub id: i64,
    pub node_id: String,
    pub node_type: NodeKind,
    pub label: String,
    /// The stored payload, for callers rendering the node.
    #[serde(rename = "config")]
    pub raw_config: serde_json::Value,
    #[serde(skip)]
    pub config: NodeConfig,
    #[serde(skip)]
    pub is_entry_flag: bool,
}

impl GraphNode {
    fn from_record(record: &NodeRecord) -> Result<GraphNode, EvalError> {
        let malformed = |message: String| EvalError::MalformedConfig {
            node_id: record.id,
            message,
        };
        let (node_type, config) = match record.node_type.as_str() {
            "question" => {
                let visibility = match record.config.get("visibility_rules") {
                    Some(rules) => Condition::parse(rules)?,
                    None => Condition::Always,
                };
                (NodeKind::Question, NodeConfig::Question { visibility })
            }
            "cost" => (
                NodeKind::Cost,
                NodeConfig::Pricing(PricingNodeConfig::parse(record.id, &record.config)?),
            ),
            other => return Err(malformed(format!("unknown node_type '{}'", other))),
        };
        if !(record.config.is_null() || record.config.is_object()) {
            return Err(malformed("config must be an object".to_string()));
        }
        let is_entry_flag = record
            .config
            .get("is_entry")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        Ok(GraphNode {
            id: record.id,
            node_id: record.node_id.clone(),
            node_type,
            label: record.label.clone(),
            raw_config: record.config.clone(),
            config,
            is_entry_flag,
        })
    }

    pub fn is_question(&self) -> bool {
        self.node_type == NodeKind::Question
    }

    /// Visibility rule of a question node; `Always` for anything else.
    pub fn visibility(&self) -> &Condition {
        static ALWAYS: Condition = Condition::Always;
        match &self.config {
            NodeConfig::Question { visibility } => visibility,
            NodeConfig::Pricing(_) => &ALWAYS,
        }
    }

    pub fn pricing(&self) -> Option<&PricingNodeConfig> {
        match &self.config {
            NodeConfig::Pricing(p) => Some(p),
            NodeConfig::Question { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEdge {
    pub id: Option<i64>,
    pub from_node_id: i64,
    pub to_node_id: i64,
    pub condition: Condition,
    pub execution_priority: i64,
}

impl GraphEdge {
    fn from_record(record: &EdgeRecord) -> Result<GraphEdge, EvalError> {
        Ok(GraphEdge {
            id: record.id,
            from_node_id: record.from_node_id,
            to_node_id: record.to_node_id,
            condition: Condition::parse(&record.edge_condition)?,
            execution_priority: record.execution_priority,
        })
    }

    pub fn is_self_loop(&self) -> bool {
        self.from_node_id == self.to_node_id
    }
}

// ──────────────────────────────────────────────
// LoadedGraph
// ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LoadedGraph {
    pub graph_id: String,
    nodes_by_id: BTreeMap<i64, GraphNode>,
    edges: Vec<GraphEdge>,
    edges_from_node: BTreeMap<i64, Vec<GraphEdge>>,
    incoming_to_node: BTreeMap<i64, Vec<GraphEdge>>,
    entry_nodes: Vec<i64>,
}

impl LoadedGraph {
    pub fn node(&self, id: i64) -> Option<&GraphNode> {
        self.nodes_by_id.get(&id)
    }

    /// Nodes in ascending id order.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes_by_id.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes_by_id.len()
    }

    /// Every edge, in stored order.
    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    /// Outgoing edges of `id`, by ascending execution priority.
    pub fn edges_from(&self, id: i64) -> &[GraphEdge] {
        self.edges_from_node
            .get(&id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn incoming(&self, id: i64) -> &[GraphEdge] {
        self.incoming_to_node
            .get(&id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Entry node ids, ascending.
    pub fn entry_ids(&self) -> &[i64] {
        &self.entry_nodes
    }

    pub fn entry_nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.entry_nodes.iter().filter_map(|id| self.nodes_by_id.get(id))
    }
}

/// Build the indexes for one graph snapshot.
///
/// Edges that reference unknown nodes are indexed as stored; structural
/// validation reports them.
pub fn load_graph(
    snapshot: &GraphSnapshot,
    convention: EntryConvention,
) -> Result<LoadedGraph, EvalError> {
    if snapshot.nodes.is_empty() {
        return Err(EvalError::GraphNotFound {
            graph_id: snapshot.graph_id.clone(),
        });
    }

    let mut nodes_by_id = BTreeMap::new();
    for record in &snapshot.nodes {
        nodes_by_id.insert(record.id, GraphNode::from_record(record)?);
    }

    let edges = snapshot
        .edges
        .iter()
        .map(GraphEdge::from_record)
        .collect::<Result<Vec<_>, _>>()?;

    let mut edges_from_node: BTreeMap<i64, Vec<GraphEdge>> = BTreeMap::new();
    let mut incoming_to_node: BTreeMap<i64, Vec<GraphEdge>> = BTreeMap::new();
    for edge in &edges {
        edges_from_node
            .entry(edge.from_node_id)
            .or_default()
            .push(edge.clone());
        incoming_to_node
            .entry(edge.to_node_id)
            .or_default()
            .push(edge.clone());
    }
    for list in edges_from_node.values_mut() {
        list.sort_by_key(|e| (e.execution_priority, e.to_node_id));
    }

    let entry_nodes = nodes_by_id
        .values()
        .filter(|n| match convention {
            EntryConvention::NoIncomingEdges => !incoming_to_node.contains_key(&n.id),
            EntryConvention::ExplicitFlag => n.is_entry_flag,
        })
        .map(|n| n.id)
        .collect();

    tracing::debug!(
        graph_id = %snapshot.graph_id,
        nodes = nodes_by_id.len(),
        edges = edges.len(),
        "graph loaded"
    );

    Ok(LoadedGraph {
        graph_id: snapshot.graph_id.clone(),
        nodes_by_id,
        edges,
        edges_from_node,
        incoming_to_node,
        entry_nodes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(v: serde_json::Value) -> GraphSnapshot {
        serde_json::from_value(v).unwrap()
    }

    fn diamond() -> GraphSnapshot {
        snapshot(json!({
            "graph_id": "g",
            "nodes": [
                { "id": 1, "node_id": "start", "node_type": "question" },
                { "id": 2, "node_id": "left", "node_type": "question",
                  "config": { "is_entry": true } },
                { "id": 3, "node_id": "right", "node_type": "question",
                  "config": { "visibility_rules": { "equals": { "fact": "a", "value": true } } } },
                { "id": 4, "node_id": "end", "node_type": "question" }
            ],
            "edges": [
                { "from_node_id": 1, "to_node_id": 3, "execution_priority": 5 },
                { "from_node_id": 1, "to_node_id": 2, "execution_priority": 1 },
                { "from_node_id": 2, "to_node_id": 4 },
                { "from_node_id": 3, "to_node_id": 4,
                  "edge_condition": { "gt": { "fact": "n", "value": 1 } } }
            ]
        }))
    }

    #[test]
    fn indexes_are_built() {
        let g = load_graph(&diamond(), EntryConvention::NoIncomingEdges).unwrap();
        assert_eq!(g.node_count(), 4);
        assert_eq!(g.incoming(4).len(), 2);
        assert!(g.incoming(1).is_empty());
        let targets: Vec<i64> = g.edges_from(1).iter().map(|e| e.to_node_id).collect();
        assert_eq!(targets, vec![2, 3]);
        assert!(g.edges_from(4).is_empty());
        assert!(matches!(
            g.node(3).unwrap().visibility(),
            Condition::Equals { .. }
        ));
    }

    #[test]
    fn entry_conventions() {
        let g = load_graph(&diamond(), EntryConvention::NoIncomingEdges).unwrap();
        assert_eq!(g.entry_ids(), &[1]);
        let g = load_graph(&diamond(), EntryConvention::ExplicitFlag).unwrap();
        assert_eq!(g.entry_ids(), &[2]);
        assert_eq!(g.entry_nodes().next().unwrap().node_id, "left");
    }

    #[test]
    fn empty_graph_is_not_found() {
        let err = load_graph(
            &snapshot(json!({ "graph_id": "nothing" })),
            EntryConvention::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            EvalError::GraphNotFound {
                graph_id: "nothing".into()
            }
        );
    }

    #[test]
    fn bad_payloads_fail_at_load() {
        let bad_condition = snapshot(json!({
            "graph_id": "g",
            "nodes": [{ "id": 1, "node_id": "a", "node_type": "question" }],
            "edges": [{ "from_node_id": 1, "to_node_id": 1, "edge_condition": { "near": 1 } }]
        }));
        assert!(matches!(
            load_graph(&bad_condition, EntryConvention::default()),
            Err(EvalError::UnsupportedCondition { .. })
        ));

        let bad_type = snapshot(json!({
            "graph_id": "g",
            "nodes": [{ "id": 1, "node_id": "a", "node_type": "photo" }]
        }));
        assert!(matches!(
            load_graph(&bad_type, EntryConvention::default()),
            Err(EvalError::MalformedConfig { node_id: 1, .. })
        ));
    }

    #[test]
    fn serialized_node_carries_raw_config() {
        let g = load_graph(&diamond(), EntryConvention::default()).unwrap();
        let v = serde_json::to_value(g.node(2).unwrap()).unwrap();
        assert_eq!(v["node_type"], "question");
        assert_eq!(v["config"]["is_entry"], true);
    }
}
