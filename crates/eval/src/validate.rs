//! Structural validation of graphs and decision trees.
//!
//! Validation collects problems instead of failing on the first one.
//! Errors make a graph unusable; warnings flag authoring mistakes that do
//! not block evaluation.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::Serialize;

use crate::graph::LoadedGraph;
use crate::pricing::PricingKind;
use crate::tree::TreeLibrary;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    fn from_parts(errors: Vec<String>, warnings: Vec<String>) -> Self {
        ValidationReport {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ValidationReport::from_parts(vec![message.into()], Vec::new())
    }

    pub fn merge(mut self, other: ValidationReport) -> Self {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.valid = self.errors.is_empty();
        self
    }
}

pub fn validate_graph_structure(graph: &LoadedGraph) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if graph.entry_ids().is_empty() {
        errors.push("graph has no entry nodes".to_string());
    }

    let mut seen: BTreeMap<&str, i64> = BTreeMap::new();
    for node in graph.nodes() {
        if let Some(first) = seen.insert(&node.node_id, node.id) {
            errors.push(format!(
                "node_id '{}' is used by nodes {} and {}",
                node.node_id, first, node.id
            ));
        }
    }

    for edge in graph.edges() {
        for end in [edge.from_node_id, edge.to_node_id] {
            if graph.node(end).is_none() {
                errors.push(format!(
                    "edge {} -> {} references unknown node {}",
                    edge.from_node_id, edge.to_node_id, end
                ));
            }
        }
        if edge.is_self_loop() {
            warnings.push(format!("node {} has an edge to itself", edge.from_node_id));
        }
    }

    let reachable = reachable_from_entries(graph);
    for node in graph.nodes().filter(|n| !reachable.contains(&n.id)) {
        errors.push(format!(
            "node {} ('{}') is unreachable from the entry nodes",
            node.id, node.node_id
        ));
    }

    for node in graph.nodes() {
        let Some(pricing) = node.pricing() else {
            continue;
        };
        for expr in pricing.expressions() {
            for pemdas in expr.pemdas_graphs() {
                for (line, target) in pemdas.missing_targets() {
                    errors.push(format!(
                        "node {}: line '{}' jumps to missing line '{}'",
                        node.id, line, target
                    ));
                }
                if let Some(path) = pemdas.jump_cycle() {
                    errors.push(format!(
                        "node {}: line jump cycle {}",
                        node.id,
                        path.join(" -> ")
                    ));
                }
            }
        }
        if let PricingKind::Cost { min, max } = &pricing.kind {
            if let (Some(lo), Some(hi)) = (min.literal(), max.literal()) {
                if lo > hi {
                    warnings.push(format!(
                        "node {}: cost_range min {} exceeds max {}",
                        node.id, lo, hi
                    ));
                }
            }
        }
    }

    ValidationReport::from_parts(errors, warnings)
}

fn reachable_from_entries(graph: &LoadedGraph) -> BTreeSet<i64> {
    let mut reached: BTreeSet<i64> = graph.entry_ids().iter().copied().collect();
    let mut queue: VecDeque<i64> = reached.iter().copied().collect();
    while let Some(id) = queue.pop_front() {
        for edge in graph.edges_from(id) {
            if reached.insert(edge.to_node_id) {
                queue.push_back(edge.to_node_id);
            }
        }
    }
    reached
}

/// Check every tree on its own, then the stored expressions and the
/// variable bindings. One broken tree or expression never hides the
/// findings of another.
pub fn validate_trees(library: &TreeLibrary) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for (tree_id, e) in library.broken_trees() {
        errors.push(format!("tree {}: {}", tree_id, e));
    }

    for tree in library.trees() {
        if tree.branches.is_empty() {
            errors.push(format!("tree {} ('{}') has no branches", tree.id, tree.name));
            continue;
        }
        for branch in &tree.branches {
            for expr_id in branch.expression_ids() {
                if let Err(e) = library.expression(expr_id) {
                    errors.push(format!(
                        "tree {} branch {}: {}",
                        tree.id, branch.order_index, e
                    ));
                }
            }
        }
        match tree
            .branches
            .iter()
            .position(|b| b.condition_expression_id.is_none())
        {
            Some(pos) => {
                let unconditional = tree.branches[pos].order_index;
                for dead in &tree.branches[pos + 1..] {
                    warnings.push(format!(
                        "tree {}: branch {} is unreachable after unconditional branch {}",
                        tree.id, dead.order_index, unconditional
                    ));
                }
            }
            None => warnings.push(format!(
                "tree {} ('{}') has no unconditional fallback branch",
                tree.id, tree.name
            )),
        }
    }

    for (expr_id, e) in library.broken_expressions() {
        errors.push(format!("expression {}: {}", expr_id, e));
    }

    for (key, tree_id) in library.bindings() {
        if !library.contains_tree(*tree_id) {
            errors.push(format!(
                "variable '{}' is bound to unknown tree {}",
                key, tree_id
            ));
        }
    }

    ValidationReport::from_parts(errors, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{load_graph, EntryConvention};
    use pricewise_interchange::{GraphSnapshot, TreeLibrarySnapshot};
    use serde_json::json;

    fn graph(v: serde_json::Value) -> LoadedGraph {
        let snapshot: GraphSnapshot = serde_json::from_value(v).unwrap();
        load_graph(&snapshot, EntryConvention::default()).unwrap()
    }

    #[test]
    fn clean_graph_is_valid() {
        let g = graph(json!({
            "graph_id": "g",
            "nodes": [
                { "id": 1, "node_id": "a", "node_type": "question" },
                { "id": 2, "node_id": "b", "node_type": "question" }
            ],
            "edges": [{ "from_node_id": 1, "to_node_id": 2 }]
        }));
        let report = validate_graph_structure(&g);
        assert!(report.valid, "{:?}", report);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn cycle_without_entry_is_reported() {
        let g = graph(json!({
            "graph_id": "g",
            "nodes": [
                { "id": 1, "node_id": "a", "node_type": "question" },
                { "id": 2, "node_id": "b", "node_type": "question" }
            ],
            "edges": [
                { "from_node_id": 1, "to_node_id": 2 },
                { "from_node_id": 2, "to_node_id": 1 }
            ]
        }));
        let report = validate_graph_structure(&g);
        assert!(!report.valid);
        assert!(report.errors[0].contains("no entry nodes"));
        assert_eq!(
            report.errors.iter().filter(|e| e.contains("unreachable")).count(),
            2
        );
    }

    #[test]
    fn structural_errors_and_warnings() {
        let g = graph(json!({
            "graph_id": "g",
            "nodes": [
                { "id": 1, "node_id": "a", "node_type": "question" },
                { "id": 2, "node_id": "a", "node_type": "question" },
                { "id": 3, "node_id": "c", "node_type": "cost",
                  "config": { "kind": "cost", "cost_range": { "min": 500, "max": 100 } } }
            ],
            "edges": [
                { "from_node_id": 1, "to_node_id": 2 },
                { "from_node_id": 2, "to_node_id": 2 },
                { "from_node_id": 1, "to_node_id": 77 }
            ]
        }));
        let report = validate_graph_structure(&g);
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("node_id 'a'")));
        assert!(report.errors.iter().any(|e| e.contains("unknown node 77")));
        assert!(report.warnings.iter().any(|w| w.contains("edge to itself")));
        assert!(report.warnings.iter().any(|w| w.contains("min 500 exceeds max 100")));
    }

    #[test]
    fn pemdas_jump_problems_are_errors() {
        let g = graph(json!({
            "graph_id": "g",
            "nodes": [
                { "id": 1, "node_id": "c", "node_type": "cost",
                  "config": { "kind": "cost", "cost_range": {
                      "min": { "pemdas": { "entry": "a", "lines": {
                          "a": [{ "kind": "constant", "value": 1, "target_line_id": "b" }],
                          "b": [{ "kind": "constant", "value": 1, "target_line_id": "a" }]
                      } } },
                      "max": { "pemdas": { "entry": "a", "lines": {
                          "a": [{ "kind": "constant", "value": 1, "target_line_id": "z" }]
                      } } }
                  } } }
            ]
        }));
        let report = validate_graph_structure(&g);
        assert!(report.errors.iter().any(|e| e.contains("cycle a -> b -> a")), "{:?}", report.errors);
        assert!(report.errors.iter().any(|e| e.contains("missing line 'z'")));
    }

    #[test]
    fn tree_checks() {
        let snapshot: TreeLibrarySnapshot = serde_json::from_value(json!({
            "trees": [
                { "id": 1, "name": "dead", "branches": [
                    { "order_index": 0, "returns": { "kind": "number", "value_expression_id": 10 } },
                    { "order_index": 1, "condition_expression_id": 11,
                      "returns": { "kind": "number", "value_expression_id": 10 } }
                ] },
                { "id": 2, "name": "open", "branches": [
                    { "order_index": 0, "condition_expression_id": 11,
                      "returns": { "kind": "number", "value_expression_id": 10 } }
                ] },
                { "id": 3, "name": "empty", "branches": [] }
            ],
            "expressions": [
                { "id": 10, "op": "number", "literal": 1 },
                { "id": 11, "op": "boolean", "literal": true }
            ]
        }))
        .unwrap();
        let library = TreeLibrary::from_snapshot(&snapshot);
        let report = validate_trees(&library);
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("tree 3"));
        assert_eq!(report.warnings.len(), 2);
        assert!(report.warnings[0].contains("branch 1 is unreachable"));
        assert!(report.warnings[1].contains("no unconditional fallback"));
    }

    #[test]
    fn broken_trees_and_expressions_are_reported_one_by_one() {
        let snapshot: TreeLibrarySnapshot = serde_json::from_value(json!({
            "trees": [
                { "id": 1, "name": "cyclic", "branches": [
                    { "order_index": 0, "returns": { "kind": "number", "value_expression_id": 90 } }
                ] },
                { "id": 2, "name": "bad kind", "branches": [
                    { "order_index": 0, "returns": { "kind": "text", "value_expression_id": 10 } }
                ] },
                { "id": 3, "name": "dead", "branches": [
                    { "order_index": 0, "returns": { "kind": "number", "value_expression_id": 10 } },
                    { "order_index": 1, "returns": { "kind": "number", "value_expression_id": 12 } }
                ] },
                { "id": 4, "name": "empty", "branches": [] }
            ],
            "expressions": [
                { "id": 10, "op": "number", "literal": 1 },
                { "id": 90, "op": "not", "left_child_id": 91 },
                { "id": 91, "op": "not", "left_child_id": 90 }
            ],
            "variable_bindings": { "rate": 7 }
        }))
        .unwrap();
        let report = validate_trees(&TreeLibrary::from_snapshot(&snapshot));
        let has = |needle: &str| report.errors.iter().any(|e| e.contains(needle));
        assert!(has("tree 2: "), "{:?}", report.errors);
        assert!(has("tree 1 branch 0: expression cycle: expr 90 -> expr 91 -> expr 90"));
        assert!(has("tree 3 branch 1: expression not found: 12"), "{:?}", report.errors);
        assert!(has("tree 4 ('empty') has no branches"));
        assert!(has("expression 90: "));
        assert!(has("expression 91: "));
        assert!(has("variable 'rate' is bound to unknown tree 7"));
        assert!(report.warnings.iter().any(|w| w.contains("tree 3: branch 1 is unreachable")));
    }

    #[test]
    fn merge_recomputes_validity() {
        let ok = ValidationReport::from_parts(vec![], vec!["w".into()]);
        assert!(ok.valid);
        let merged = ok.merge(ValidationReport::error("boom"));
        assert!(!merged.valid);
        assert_eq!(merged.warnings, vec!["w".to_string()]);
    }
}
