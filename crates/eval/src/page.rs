//! Page executor: the next batch of questions to ask.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::condition;
use crate::error::EvalError;
use crate::fact::FactMap;
use crate::graph::{GraphNode, LoadedGraph};

pub const DEFAULT_PAGE_SIZE: usize = 6;

#[derive(Debug, Clone, Serialize)]
pub struct PageResult {
    pub page_nodes: Vec<GraphNode>,
    /// No ready node and no candidate left that could become ready.
    pub completed: bool,
    /// Visible, unanswered questions whose incoming edges are not yet
    /// satisfied.
    pub blocked: Vec<i64>,
}

/// Compute the next page of at most `page_size` questions.
///
/// A candidate is an unanswered question whose visibility rule holds. A
/// candidate is ready when it is an entry node of the graph, or when any
/// incoming edge comes from an answered node and its condition holds.
pub fn compute_page(
    graph: &LoadedGraph,
    facts: &FactMap,
    answered: &BTreeSet<i64>,
    page_size: usize,
) -> Result<PageResult, EvalError> {
    let mut ready = Vec::new();
    let mut blocked = Vec::new();

    for node in graph.nodes().filter(|n| n.is_question() && !answered.contains(&n.id)) {
        if !condition::evaluate(node.visibility(), facts)? {
            continue;
        }
        if is_ready(graph, node.id, facts, answered)? {
            ready.push(node);
        } else {
            blocked.push(node.id);
        }
    }

    // graph.nodes() yields ascending ids, so `ready` is already sorted.
    let completed = ready.is_empty() && blocked.is_empty();
    let page_nodes: Vec<GraphNode> = ready.into_iter().take(page_size).cloned().collect();

    tracing::debug!(
        graph_id = %graph.graph_id,
        page = ?page_nodes.iter().map(|n| n.id).collect::<Vec<_>>(),
        blocked = blocked.len(),
        completed,
        "page computed"
    );

    Ok(PageResult {
        page_nodes,
        completed,
        blocked,
    })
}

fn is_ready(
    graph: &LoadedGraph,
    node_id: i64,
    facts: &FactMap,
    answered: &BTreeSet<i64>,
) -> Result<bool, EvalError> {
    if graph.entry_ids().contains(&node_id) {
        return Ok(true);
    }
    for edge in graph.incoming(node_id) {
        if answered.contains(&edge.from_node_id) && condition::evaluate(&edge.condition, facts)? {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fact::FactValue;
    use crate::graph::{load_graph, EntryConvention};
    use pricewise_interchange::GraphSnapshot;
    use rust_decimal::Decimal;
    use serde_json::json;

    fn graph(v: serde_json::Value) -> LoadedGraph {
        graph_with(v, EntryConvention::default())
    }

    fn graph_with(v: serde_json::Value, convention: EntryConvention) -> LoadedGraph {
        let snapshot: GraphSnapshot = serde_json::from_value(v).unwrap();
        load_graph(&snapshot, convention).unwrap()
    }

    fn ids(page: &PageResult) -> Vec<i64> {
        page.page_nodes.iter().map(|n| n.id).collect()
    }

    fn answered(ids: &[i64]) -> BTreeSet<i64> {
        ids.iter().copied().collect()
    }

    fn roof_flow() -> LoadedGraph {
        graph(json!({
            "graph_id": "roof",
            "nodes": [
                { "id": 1, "node_id": "type", "node_type": "question" },
                { "id": 2, "node_id": "sqft", "node_type": "question" },
                { "id": 3, "node_id": "pitch", "node_type": "question" },
                { "id": 4, "node_id": "skylights", "node_type": "question",
                  "config": { "visibility_rules": { "equals": { "fact": "type", "value": "roof" } } } },
                { "id": 9, "node_id": "tearoff", "node_type": "cost",
                  "config": { "kind": "cost", "cost_range": { "min": 1, "max": 2 } } }
            ],
            "edges": [
                { "from_node_id": 1, "to_node_id": 2 },
                { "from_node_id": 1, "to_node_id": 3,
                  "edge_condition": { "equals": { "fact": "type", "value": "roof" } } },
                { "from_node_id": 2, "to_node_id": 3 }
            ]
        }))
    }

    #[test]
    fn first_page_is_entry_questions() {
        let page = compute_page(&roof_flow(), &FactMap::new(), &answered(&[]), 6).unwrap();
        assert_eq!(ids(&page), vec![1]);
        assert_eq!(page.blocked, vec![2, 3]);
        assert!(!page.completed);
    }

    #[test]
    fn incoming_edges_are_or_combined() {
        let facts: FactMap = [("type", FactValue::Text("roof".into()))].into_iter().collect();
        let page = compute_page(&roof_flow(), &facts, &answered(&[1]), 6).unwrap();
        assert_eq!(ids(&page), vec![2, 3, 4]);
        assert!(page.blocked.is_empty());
    }

    #[test]
    fn page_is_bounded_and_sorted() {
        let facts: FactMap = [("type", FactValue::Text("roof".into()))].into_iter().collect();
        let page = compute_page(&roof_flow(), &facts, &answered(&[1]), 2).unwrap();
        assert_eq!(ids(&page), vec![2, 3]);
        assert!(!page.completed);
    }

    #[test]
    fn completes_when_nothing_is_left() {
        let facts: FactMap = [("type", FactValue::Text("siding".into()))].into_iter().collect();
        let page = compute_page(&roof_flow(), &facts, &answered(&[1, 2, 3]), 6).unwrap();
        assert!(page.page_nodes.is_empty());
        assert!(page.completed);
    }

    #[test]
    fn unsatisfiable_edge_never_completes() {
        let g = graph(json!({
            "graph_id": "stuck",
            "nodes": [
                { "id": 1, "node_id": "a", "node_type": "question" },
                { "id": 2, "node_id": "b", "node_type": "question" }
            ],
            "edges": [
                { "from_node_id": 1, "to_node_id": 2,
                  "edge_condition": { "gt": { "fact": "n", "value": 10 } } }
            ]
        }));
        let facts: FactMap = [("n", FactValue::Number(Decimal::from(3)))].into_iter().collect();
        for _ in 0..3 {
            let page = compute_page(&g, &facts, &answered(&[1]), 6).unwrap();
            assert!(page.page_nodes.is_empty());
            assert_eq!(page.blocked, vec![2]);
            assert!(!page.completed);
        }
    }

    #[test]
    fn flagged_entry_with_back_edge_is_offered_first() {
        let g = graph_with(
            json!({
                "graph_id": "loop",
                "nodes": [
                    { "id": 1, "node_id": "start", "node_type": "question",
                      "config": { "is_entry": true } },
                    { "id": 2, "node_id": "next", "node_type": "question" }
                ],
                "edges": [
                    { "from_node_id": 1, "to_node_id": 2 },
                    { "from_node_id": 2, "to_node_id": 1 }
                ]
            }),
            EntryConvention::ExplicitFlag,
        );
        assert_eq!(g.entry_ids(), &[1]);

        let first = compute_page(&g, &FactMap::new(), &answered(&[]), 6).unwrap();
        assert_eq!(ids(&first), vec![1]);
        assert_eq!(first.blocked, vec![2]);

        let second = compute_page(&g, &FactMap::new(), &answered(&[1]), 6).unwrap();
        assert_eq!(ids(&second), vec![2]);

        let done = compute_page(&g, &FactMap::new(), &answered(&[1, 2]), 6).unwrap();
        assert!(done.completed);
    }

    #[test]
    fn unflagged_root_is_not_an_entry_under_explicit_flag() {
        let g = graph_with(
            json!({
                "graph_id": "flagged",
                "nodes": [
                    { "id": 1, "node_id": "orphan", "node_type": "question" },
                    { "id": 2, "node_id": "start", "node_type": "question",
                      "config": { "is_entry": true } }
                ]
            }),
            EntryConvention::ExplicitFlag,
        );
        let page = compute_page(&g, &FactMap::new(), &answered(&[]), 6).unwrap();
        assert_eq!(ids(&page), vec![2]);
        assert_eq!(page.blocked, vec![1]);
    }

    #[test]
    fn answered_nodes_never_reappear() {
        let page = compute_page(&roof_flow(), &FactMap::new(), &answered(&[1]), 6).unwrap();
        assert!(!ids(&page).contains(&1));
    }

    #[test]
    fn visibility_type_errors_propagate() {
        let g = graph(json!({
            "graph_id": "g",
            "nodes": [{ "id": 1, "node_id": "a", "node_type": "question",
                        "config": { "visibility_rules": { "gt": { "fact": "t", "value": 1 } } } }]
        }));
        let facts: FactMap = [("t", FactValue::Text("x".into()))].into_iter().collect();
        assert!(matches!(
            compute_page(&g, &facts, &answered(&[]), 6),
            Err(EvalError::TypeMismatch { .. })
        ));
    }
}
