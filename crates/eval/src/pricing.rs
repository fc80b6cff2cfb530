//! Pricing graph execution.
//!
//! Pricing nodes run in ascending `execution_priority`, ties broken by
//! node id. A node whose `applies_if` condition is false is skipped.
//! `var` nodes write variables into the run's [`RuntimeContext`]; `cost`
//! nodes evaluate their min and max independently and emit a
//! [`CostLineItem`]. Min is never reordered against max.

use std::collections::BTreeMap;
use std::fmt;

use pricewise_storage::CostLineItemRecord;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::condition::Condition;
use crate::context::RuntimeContext;
use crate::error::EvalError;
use crate::fact::{FactMap, FactValue};
use crate::graph::LoadedGraph;
use crate::numeric;
use crate::tree::TreeLibrary;
use crate::value_expr::ValueExpr;

// ──────────────────────────────────────────────
// Configuration
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Category {
    Labor,
    Materials,
    Demo,
    Permits,
    Contingency,
    Other,
}

impl Category {
    pub fn parse(raw: &str) -> Option<Category> {
        match raw.to_ascii_lowercase().as_str() {
            "labor" | "labour" => Some(Category::Labor),
            "materials" | "material" => Some(Category::Materials),
            "demo" | "demolition" => Some(Category::Demo),
            "permits" | "permit" => Some(Category::Permits),
            "contingency" => Some(Category::Contingency),
            "other" => Some(Category::Other),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Labor => "Labor",
            Category::Materials => "Materials",
            Category::Demo => "Demo",
            Category::Permits => "Permits",
            Category::Contingency => "Contingency",
            Category::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProduceMode {
    Set,
    Add,
    Multiply,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Produce {
    pub key: String,
    pub value: ValueExpr,
    pub mode: ProduceMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PricingKind {
    Var { produces: Vec<Produce> },
    Cost { min: ValueExpr, max: ValueExpr },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingNodeConfig {
    pub kind: PricingKind,
    pub category: Category,
    pub applies_if: Option<Condition>,
    pub explanation_template: Option<String>,
    pub execution_priority: i64,
}

impl PricingNodeConfig {
    pub fn parse(node_id: i64, config: &serde_json::Value) -> Result<Self, EvalError> {
        let malformed = |message: String| EvalError::MalformedConfig { node_id, message };
        let expr = |v: &serde_json::Value, what: &str| {
            ValueExpr::parse(v).map_err(|e| malformed(format!("{}: {}", what, e)))
        };

        let category = match config.get("category").and_then(|c| c.as_str()) {
            None => Category::Other,
            Some(raw) => Category::parse(raw)
                .ok_or_else(|| malformed(format!("unknown category '{}'", raw)))?,
        };
        let applies_if = match config.get("applies_if") {
            None | Some(serde_json::Value::Null) => None,
            Some(c) => Some(Condition::parse(c)?),
        };
        let explanation_template = config
            .get("explanation_template")
            .and_then(|t| t.as_str())
            .map(str::to_string);
        let execution_priority = match config.get("execution_priority") {
            None | Some(serde_json::Value::Null) => 0,
            Some(p) => integral(p)
                .ok_or_else(|| malformed(format!("execution_priority {} is not an integer", p)))?,
        };

        let kind = match config.get("kind").and_then(|k| k.as_str()) {
            Some("var") => {
                let entries = match config.get("produces") {
                    None | Some(serde_json::Value::Null) => &[][..],
                    Some(serde_json::Value::Array(items)) => items.as_slice(),
                    Some(_) => return Err(malformed("produces must be a list".to_string())),
                };
                let mut produces = Vec::with_capacity(entries.len());
                for entry in entries {
                    let key = entry
                        .get("key")
                        .and_then(|k| k.as_str())
                        .ok_or_else(|| malformed("produces entry needs a key".to_string()))?;
                    let value = entry
                        .get("value")
                        .ok_or_else(|| malformed(format!("produces '{}' needs a value", key)))?;
                    let mode = match entry.get("mode").and_then(|m| m.as_str()) {
                        None | Some("set") => ProduceMode::Set,
                        Some("add") => ProduceMode::Add,
                        Some("multiply") => ProduceMode::Multiply,
                        Some(other) => {
                            return Err(malformed(format!("unknown produce mode '{}'", other)))
                        }
                    };
                    produces.push(Produce {
                        key: key.to_string(),
                        value: expr(value, key)?,
                        mode,
                    });
                }
                PricingKind::Var { produces }
            }
            Some("cost") => {
                let range = config
                    .get("cost_range")
                    .ok_or_else(|| malformed("cost node needs cost_range".to_string()))?;
                let bound = |name: &str| {
                    range
                        .get(name)
                        .ok_or_else(|| malformed(format!("cost_range needs {}", name)))
                        .and_then(|v| expr(v, name))
                };
                PricingKind::Cost {
                    min: bound("min")?,
                    max: bound("max")?,
                }
            }
            Some(other) => return Err(malformed(format!("unknown pricing kind '{}'", other))),
            None => return Err(malformed("pricing config needs a kind".to_string())),
        };

        Ok(PricingNodeConfig {
            kind,
            category,
            applies_if,
            explanation_template,
            execution_priority,
        })
    }

    /// Every value expression the node evaluates.
    pub fn expressions(&self) -> Vec<&ValueExpr> {
        match &self.kind {
            PricingKind::Var { produces } => produces.iter().map(|p| &p.value).collect(),
            PricingKind::Cost { min, max } => vec![min, max],
        }
    }
}

// ──────────────────────────────────────────────
// Output
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CostLineItem {
    pub run_id: String,
    pub node_id: i64,
    pub category: Category,
    pub label: String,
    pub min_cost: Decimal,
    pub max_cost: Decimal,
    pub explanation: String,
    pub applied_facts: BTreeMap<String, FactValue>,
}

impl CostLineItem {
    /// Rebuild an item from its persisted form.
    pub fn from_record(record: &CostLineItemRecord) -> Result<CostLineItem, EvalError> {
        let category = Category::parse(&record.category).ok_or_else(|| EvalError::MalformedConfig {
            node_id: record.node_id,
            message: format!("stored line item has unknown category '{}'", record.category),
        })?;
        let applied_facts = match &record.applied_facts {
            serde_json::Value::Object(map) => map
                .iter()
                .filter_map(|(k, v)| FactValue::from_json(v).map(|f| (k.clone(), f)))
                .collect(),
            _ => BTreeMap::new(),
        };
        Ok(CostLineItem {
            run_id: record.run_id.clone(),
            node_id: record.node_id,
            category,
            label: record.label.clone(),
            min_cost: record.min_cost,
            max_cost: record.max_cost,
            explanation: record.explanation.clone(),
            applied_facts,
        })
    }
}

impl From<&CostLineItem> for CostLineItemRecord {
    fn from(item: &CostLineItem) -> Self {
        CostLineItemRecord {
            run_id: item.run_id.clone(),
            node_id: item.node_id,
            category: item.category.as_str().to_string(),
            label: item.label.clone(),
            min_cost: item.min_cost,
            max_cost: item.max_cost,
            explanation: item.explanation.clone(),
            applied_facts: serde_json::Value::Object(
                item.applied_facts
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

/// Everything one pricing run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricingRun {
    pub run_id: String,
    pub graph_id: String,
    pub items: Vec<CostLineItem>,
    /// Explicit variable bindings at the end of the run.
    pub variables: BTreeMap<String, Decimal>,
}

// ──────────────────────────────────────────────
// Execution
// ──────────────────────────────────────────────

/// A JSON number with no fractional part, so `2` and `2.0` both read as 2.
fn integral(value: &serde_json::Value) -> Option<i64> {
    if !value.is_number() {
        return None;
    }
    numeric::decimal_from_json(value)
        .filter(|d| d.fract().is_zero())
        .and_then(|d| d.to_i64())
}

/// Price a graph with a fresh context over `library` and `facts`.
pub fn execute_pricing_graph(
    graph: &LoadedGraph,
    run_id: &str,
    library: &TreeLibrary,
    facts: FactMap,
) -> Result<PricingRun, EvalError> {
    let mut ctx = RuntimeContext::new(library, facts);
    execute_pricing(graph, run_id, &mut ctx)
}

/// Execute every pricing node of `graph` against `ctx`.
pub fn execute_pricing(
    graph: &LoadedGraph,
    run_id: &str,
    ctx: &mut RuntimeContext<'_>,
) -> Result<PricingRun, EvalError> {
    let mut nodes: Vec<_> = graph
        .nodes()
        .filter_map(|n| n.pricing().map(|p| (n, p)))
        .collect();
    nodes.sort_by_key(|(n, p)| (p.execution_priority, n.id));

    let mut items = Vec::new();
    for (node, config) in nodes {
        ctx.begin_trace();
        if let Some(condition) = &config.applies_if {
            if !ctx.condition(condition)? {
                tracing::debug!(run_id, node_id = node.id, "skipped by applies_if");
                continue;
            }
        }

        match &config.kind {
            PricingKind::Var { produces } => {
                for produce in produces {
                    let value = produce.value.evaluate(ctx)?.as_scalar()?;
                    let next = match produce.mode {
                        ProduceMode::Set => value,
                        ProduceMode::Add => {
                            let current = ctx.current_variable(&produce.key)?.unwrap_or(Decimal::ZERO);
                            numeric::checked_add(current, value)?
                        }
                        ProduceMode::Multiply => {
                            let current = ctx.current_variable(&produce.key)?.unwrap_or(Decimal::ONE);
                            numeric::checked_mul(current, value)?
                        }
                    };
                    ctx.set_variable(&produce.key, next);
                }
            }
            PricingKind::Cost { min, max } => {
                let min_cost = numeric::round_money(min.evaluate(ctx)?.amount()?);
                let max_cost = numeric::round_money(max.evaluate(ctx)?.amount()?);
                let explanation = match &config.explanation_template {
                    Some(template) => render_explanation(template, &node.label, min_cost, max_cost, ctx),
                    None => node.label.clone(),
                };
                tracing::debug!(
                    run_id,
                    node_id = node.id,
                    %min_cost,
                    %max_cost,
                    "line item emitted"
                );
                items.push(CostLineItem {
                    run_id: run_id.to_string(),
                    node_id: node.id,
                    category: config.category,
                    label: node.label.clone(),
                    min_cost,
                    max_cost,
                    explanation,
                    applied_facts: ctx.applied_facts(),
                });
            }
        }
    }

    Ok(PricingRun {
        run_id: run_id.to_string(),
        graph_id: graph.graph_id.clone(),
        items,
        variables: ctx.variables(),
    })
}

/// Fill `{{name}}` placeholders from min, max, label, variables and
/// facts, in that order. Unknown placeholders are kept verbatim.
fn render_explanation(
    template: &str,
    label: &str,
    min_cost: Decimal,
    max_cost: Decimal,
    ctx: &RuntimeContext<'_>,
) -> String {
    let variables = ctx.variables();
    let lookup = |name: &str| -> Option<String> {
        match name {
            "min" => Some(format!("{:.2}", min_cost)),
            "max" => Some(format!("{:.2}", max_cost)),
            "label" => Some(label.to_string()),
            _ => variables
                .get(name)
                .map(|v| v.normalize().to_string())
                .or_else(|| ctx.facts().get(name).map(|f| f.to_string())),
        }
    };

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = after[..end].trim();
                match lookup(name) {
                    Some(value) => out.push_str(&value),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{load_graph, EntryConvention};
    use pricewise_interchange::GraphSnapshot;
    use serde_json::json;

    fn graph(nodes: serde_json::Value) -> LoadedGraph {
        let snapshot: GraphSnapshot =
            serde_json::from_value(json!({ "graph_id": "pricing", "nodes": nodes })).unwrap();
        load_graph(&snapshot, EntryConvention::default()).unwrap()
    }

    fn facts(sqft: i64) -> FactMap {
        [
            ("sqft", FactValue::Number(Decimal::from(sqft))),
            ("roof", FactValue::Text("metal".into())),
        ]
        .into_iter()
        .collect()
    }

    fn run(g: &LoadedGraph, facts: FactMap) -> Result<PricingRun, EvalError> {
        execute_pricing_graph(g, "run-1", &TreeLibrary::default(), facts)
    }

    #[test]
    fn var_nodes_feed_cost_nodes_in_priority_order() {
        let g = graph(json!([
            { "id": 3, "node_id": "tearoff", "node_type": "cost", "label": "Tear-off",
              "config": { "kind": "cost", "category": "Demo", "execution_priority": 10,
                          "cost_range": {
                              "min": { "op": "*", "left": { "fact": "sqft" }, "right": { "var": "rate" } },
                              "max": { "op": "*", "left": { "fact": "sqft" }, "right": 2.5 } } } },
            { "id": 1, "node_id": "rate", "node_type": "cost", "label": "Rate",
              "config": { "kind": "var", "execution_priority": 1,
                          "produces": [{ "key": "rate", "value": 1.25 }] } },
            { "id": 2, "node_id": "steep", "node_type": "cost", "label": "Steep",
              "config": { "kind": "var", "execution_priority": 1,
                          "produces": [{ "key": "rate", "value": 2, "mode": "multiply" }] } }
        ]));
        let out = run(&g, facts(1000)).unwrap();
        assert_eq!(out.items.len(), 1);
        let item = &out.items[0];
        assert_eq!(item.category, Category::Demo);
        assert_eq!(item.min_cost, Decimal::from(2500));
        assert_eq!(item.max_cost, Decimal::from(2500));
        assert_eq!(out.variables.get("rate"), Some(&Decimal::new(250, 2)));
        assert!(item.applied_facts.contains_key("sqft"));
    }

    #[test]
    fn applies_if_skips_nodes() {
        let g = graph(json!([
            { "id": 1, "node_id": "metal", "node_type": "cost", "label": "Metal",
              "config": { "kind": "cost", "category": "Materials",
                          "applies_if": { "equals": { "fact": "roof", "value": "metal" } },
                          "cost_range": { "min": 100, "max": 200 } } },
            { "id": 2, "node_id": "tile", "node_type": "cost", "label": "Tile",
              "config": { "kind": "cost", "category": "Materials",
                          "applies_if": { "equals": { "fact": "roof", "value": "tile" } },
                          "cost_range": { "min": 300, "max": 400 } } }
        ]));
        let out = run(&g, facts(1)).unwrap();
        assert_eq!(out.items.len(), 1);
        assert_eq!(out.items[0].node_id, 1);
        assert_eq!(
            out.items[0].applied_facts.get("roof"),
            Some(&FactValue::Text("metal".into()))
        );
    }

    #[test]
    fn add_and_multiply_treat_unbound_as_identity() {
        let g = graph(json!([
            { "id": 1, "node_id": "v", "node_type": "cost", "label": "v",
              "config": { "kind": "var", "produces": [
                  { "key": "a", "value": 5, "mode": "add" },
                  { "key": "m", "value": 3, "mode": "multiply" },
                  { "key": "a", "value": 2, "mode": "add" }
              ] } }
        ]));
        let out = run(&g, facts(1)).unwrap();
        assert_eq!(out.variables["a"], Decimal::from(7));
        assert_eq!(out.variables["m"], Decimal::from(3));
        assert!(out.items.is_empty());
    }

    #[test]
    fn min_is_not_reordered_against_max() {
        let g = graph(json!([
            { "id": 1, "node_id": "odd", "node_type": "cost", "label": "Odd",
              "config": { "kind": "cost", "category": "Other",
                          "cost_range": { "min": 900, "max": 100 } } }
        ]));
        let out = run(&g, facts(1)).unwrap();
        assert_eq!(out.items[0].min_cost, Decimal::from(900));
        assert_eq!(out.items[0].max_cost, Decimal::from(100));
    }

    #[test]
    fn amounts_are_rounded_to_cents() {
        let g = graph(json!([
            { "id": 1, "node_id": "r", "node_type": "cost", "label": "R",
              "config": { "kind": "cost", "category": "Labor",
                          "cost_range": { "min": "10.005", "max": { "op": "/", "left": 10, "right": 3 } } } }
        ]));
        let out = run(&g, facts(1)).unwrap();
        assert_eq!(out.items[0].min_cost, Decimal::new(1000, 2));
        assert_eq!(out.items[0].max_cost, Decimal::new(333, 2));
    }

    #[test]
    fn explanation_fills_known_placeholders() {
        let g = graph(json!([
            { "id": 1, "node_id": "v", "node_type": "cost", "label": "v",
              "config": { "kind": "var", "produces": [{ "key": "rate", "value": 3 }] } },
            { "id": 2, "node_id": "c", "node_type": "cost", "label": "Shingles",
              "config": { "kind": "cost", "category": "Materials", "execution_priority": 1,
                          "explanation_template": "{{label}}: {{sqft}} sqft at {{ rate }} = {{min}}-{{max}} {{unknown}} {{",
                          "cost_range": { "min": 3000, "max": 3500.5 } } }
        ]));
        let out = run(&g, facts(1000)).unwrap();
        assert_eq!(
            out.items[0].explanation,
            "Shingles: 1000 sqft at 3 = 3000.00-3500.50 {{unknown}} {{"
        );
    }

    #[test]
    fn boolean_bound_is_a_type_mismatch() {
        let g = graph(json!([
            { "id": 1, "node_id": "c", "node_type": "cost", "label": "c",
              "config": { "kind": "cost", "category": "Other",
                          "cost_range": { "min": { "fact": "flag" }, "max": 1 } } }
        ]));
        let mut f = facts(1);
        f.insert("flag", FactValue::Bool(true));
        assert!(matches!(run(&g, f), Err(EvalError::TypeMismatch { .. })));
    }

    #[test]
    fn var_facts_reach_the_cost_nodes_that_use_them() {
        let g = graph(json!([
            { "id": 1, "node_id": "area", "node_type": "cost", "label": "Area",
              "config": { "kind": "var", "produces": [{ "key": "area", "value": { "fact": "sqft" } }] } },
            { "id": 2, "node_id": "deck", "node_type": "cost", "label": "Deck",
              "config": { "kind": "cost", "execution_priority": 1,
                          "cost_range": { "min": { "var": "area" }, "max": { "var": "area" } } } }
        ]));
        let out = run(&g, facts(40)).unwrap();
        assert_eq!(out.items[0].min_cost, Decimal::from(40));
        assert_eq!(
            out.items[0].applied_facts.get("sqft"),
            Some(&FactValue::Number(Decimal::from(40)))
        );
    }

    #[test]
    fn integral_float_priorities_are_accepted() {
        let config = json!({ "kind": "cost", "execution_priority": 2.0,
                             "cost_range": { "min": 1, "max": 1 } });
        assert_eq!(PricingNodeConfig::parse(1, &config).unwrap().execution_priority, 2);
        for bad in [json!(2.5), json!("2")] {
            let config = json!({ "kind": "cost", "execution_priority": bad,
                                 "cost_range": { "min": 1, "max": 1 } });
            assert!(PricingNodeConfig::parse(1, &config).is_err(), "{}", bad);
        }
    }

    #[test]
    fn unreferenced_broken_expressions_do_not_block_pricing() {
        let snapshot: pricewise_interchange::TreeLibrarySnapshot = serde_json::from_value(json!({
            "expressions": [
                { "id": 90, "op": "not", "left_child_id": 91 },
                { "id": 91, "op": "not", "left_child_id": 90 }
            ]
        }))
        .unwrap();
        let library = TreeLibrary::from_snapshot(&snapshot);
        let g = graph(json!([
            { "id": 1, "node_id": "permit", "node_type": "cost", "label": "Permit",
              "config": { "kind": "cost", "category": "Permits",
                          "cost_range": { "min": 150, "max": 250 } } }
        ]));
        let out = execute_pricing_graph(&g, "run-1", &library, facts(1)).unwrap();
        assert_eq!(out.items.len(), 1);
        assert_eq!(out.items[0].max_cost, Decimal::from(250));
    }

    #[test]
    fn config_errors_name_the_node() {
        for (config, needle) in [
            (json!({ "kind": "cost", "category": "Gold", "cost_range": { "min": 1, "max": 1 } }), "category"),
            (json!({ "kind": "cost" }), "cost_range"),
            (json!({ "kind": "var", "produces": [{ "key": "x", "value": 1, "mode": "pow" }] }), "mode"),
            (json!({ "kind": "fee" }), "kind"),
            (json!({ "kind": "cost", "cost_range": { "min": { "nope": 1 }, "max": 1 } }), "min"),
        ] {
            match PricingNodeConfig::parse(42, &config) {
                Err(EvalError::MalformedConfig { node_id: 42, message }) => {
                    assert!(message.contains(needle), "{} should mention {}", message, needle)
                }
                other => panic!("expected MalformedConfig for {}, got {:?}", config, other),
            }
        }
    }

    #[test]
    fn records_round_trip() {
        let item = CostLineItem {
            run_id: "r".into(),
            node_id: 4,
            category: Category::Permits,
            label: "Permit".into(),
            min_cost: Decimal::new(12550, 2),
            max_cost: Decimal::from(200),
            explanation: "Permit".into(),
            applied_facts: [("sqft".to_string(), FactValue::Number(Decimal::from(10)))]
                .into_iter()
                .collect(),
        };
        let record = CostLineItemRecord::from(&item);
        assert_eq!(record.category, "Permits");
        assert_eq!(CostLineItem::from_record(&record).unwrap(), item);
    }
}
