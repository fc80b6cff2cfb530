//! Property tests for cost arithmetic, tree evaluation, paging and
//! pricing determinism.

use std::collections::BTreeSet;

use pricewise_eval::{
    compute_page, evaluate_decision_tree, execute_pricing_graph, load_graph, ArithOp,
    CostBreakdown, EntryConvention, FactMap, FactValue, LoadedGraph, TreeLibrary,
};
use pricewise_interchange::{GraphSnapshot, TreeLibrarySnapshot};
use proptest::collection::btree_set;
use proptest::prelude::*;
use rust_decimal::Decimal;
use serde_json::json;

// =============================================================================
// FIXTURES
// =============================================================================

fn cents() -> impl Strategy<Value = Decimal> {
    (-10_000_000i64..10_000_000).prop_map(|c| Decimal::new(c, 2))
}

fn breakdown() -> impl Strategy<Value = CostBreakdown> {
    (cents(), cents(), cents()).prop_map(|(l, m, x)| CostBreakdown::new(l, m, x).unwrap())
}

fn sqft(n: i64) -> FactMap {
    [("sqft", FactValue::Number(Decimal::from(n)))]
        .into_iter()
        .collect()
}

fn rate_library() -> TreeLibrary {
    let snapshot: TreeLibrarySnapshot = serde_json::from_value(json!({
        "trees": [{ "id": 1, "name": "rate", "branches": [
            { "order_index": 0, "condition_expression_id": 3,
              "returns": { "kind": "number", "value_expression_id": 4 } },
            { "order_index": 1,
              "returns": { "kind": "adjustment", "adjustments": [
                  { "order_index": 0, "operation": "+", "value_expression_id": 1 },
                  { "order_index": 1, "operation": "*", "value_expression_id": 5 }
              ] } }
        ] }],
        "expressions": [
            { "id": 1, "op": "fact", "fact_key": "sqft" },
            { "id": 2, "op": "number", "literal": 2000 },
            { "id": 3, "op": ">", "left_child_id": 1, "right_child_id": 2 },
            { "id": 4, "op": "number", "literal": 500 },
            { "id": 5, "op": "number", "literal": "0.1" }
        ],
        "variable_bindings": { "rate": 1 }
    }))
    .unwrap();
    TreeLibrary::from_snapshot(&snapshot)
}

/// A chain of `len` questions where each edge requires `step > i`.
fn chain(len: i64) -> LoadedGraph {
    let nodes: Vec<_> = (1..=len)
        .map(|i| json!({ "id": i, "node_id": format!("q{}", i), "node_type": "question" }))
        .collect();
    let edges: Vec<_> = (1..len)
        .map(|i| json!({ "from_node_id": i, "to_node_id": i + 1,
                         "edge_condition": { "gt": { "fact": "step", "value": i } } }))
        .collect();
    let snapshot: GraphSnapshot =
        serde_json::from_value(json!({ "graph_id": "chain", "nodes": nodes, "edges": edges }))
            .unwrap();
    load_graph(&snapshot, EntryConvention::default()).unwrap()
}

fn pricing_graph() -> LoadedGraph {
    let snapshot: GraphSnapshot = serde_json::from_value(json!({
        "graph_id": "p",
        "nodes": [
            { "id": 1, "node_id": "v", "node_type": "cost", "label": "v",
              "config": { "kind": "var", "produces": [
                  { "key": "base", "value": { "tree": 1 } },
                  { "key": "base", "value": "1.5", "mode": "multiply" }
              ] } },
            { "id": 2, "node_id": "a", "node_type": "cost", "label": "A",
              "config": { "kind": "cost", "category": "Labor", "execution_priority": 5,
                          "cost_range": { "min": { "var": "base" },
                                          "max": { "op": "/", "left": { "var": "base" }, "right": 3 } } } },
            { "id": 3, "node_id": "b", "node_type": "cost", "label": "B",
              "config": { "kind": "cost", "category": "Other", "execution_priority": 5,
                          "applies_if": { "lt": { "fact": "sqft", "value": 1000 } },
                          "cost_range": { "min": 10, "max": 20 } } }
        ]
    }))
    .unwrap();
    load_graph(&snapshot, EntryConvention::default()).unwrap()
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// `+` and `-` keep total equal to the sum of the buckets.
    #[test]
    fn cost_additivity(a in breakdown(), b in breakdown(), subtract in any::<bool>()) {
        let op = if subtract { ArithOp::Sub } else { ArithOp::Add };
        let c = a.combine(op, &b).unwrap();
        prop_assert_eq!(c.labor + c.materials + c.misc, c.total);
    }

    /// Dividing by a zero-total breakdown leaves the left side unchanged.
    #[test]
    fn divide_by_zero_is_identity(a in breakdown()) {
        prop_assert_eq!(a.combine(ArithOp::Div, &CostBreakdown::ZERO).unwrap(), a);
    }

    /// Repeated evaluation of a tree with the same facts agrees.
    #[test]
    fn branch_determinism(n in 0i64..10_000) {
        let library = rate_library();
        let first = evaluate_decision_tree(&library, 1, sqft(n)).unwrap();
        let second = evaluate_decision_tree(&library, 1, sqft(n)).unwrap();
        prop_assert_eq!(first, second);
    }

    /// Answered nodes never appear on a page, and completion means
    /// nothing is ready or waiting.
    #[test]
    fn page_never_repeats_answered(
        answered in btree_set(1i64..=8, 0..8),
        step in 0i64..10,
        page_size in 1usize..8,
    ) {
        let graph = chain(8);
        let facts: FactMap = [("step", FactValue::Number(Decimal::from(step)))]
            .into_iter()
            .collect();
        let page = compute_page(&graph, &facts, &answered, page_size).unwrap();
        prop_assert!(page.page_nodes.len() <= page_size);
        for node in &page.page_nodes {
            prop_assert!(!answered.contains(&node.id));
        }
        prop_assert_eq!(page.completed, page.page_nodes.is_empty() && page.blocked.is_empty());
    }

    /// A node behind an unsatisfiable edge keeps the flow incomplete.
    #[test]
    fn blocked_node_never_completes(step in 0i64..2) {
        let graph = chain(3);
        let facts: FactMap = [("step", FactValue::Number(Decimal::from(step)))]
            .into_iter()
            .collect();
        let answered: BTreeSet<i64> = [1, 2].into_iter().collect();
        let page = compute_page(&graph, &facts, &answered, 6).unwrap();
        prop_assert!(page.page_nodes.is_empty());
        prop_assert!(!page.completed);
    }

    /// Pricing the same graph twice with the same facts emits the same items.
    #[test]
    fn pricing_is_idempotent(n in 0i64..5_000) {
        let graph = pricing_graph();
        let library = rate_library();
        let first = execute_pricing_graph(&graph, "r", &library, sqft(n)).unwrap();
        let second = execute_pricing_graph(&graph, "r", &library, sqft(n)).unwrap();
        prop_assert_eq!(&first, &second);
        for item in &first.items {
            prop_assert_eq!(item.min_cost.round_dp(2), item.min_cost);
        }
    }
}
