//! Deserialization from bundle JSON into typed structs.
//!
//! The main entry point is [`from_bundle_json`], which takes a
//! `&serde_json::Value` and produces an [`EstimateBundle`].

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;

use crate::types::*;

/// Errors during bundle deserialization.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InterchangeError {
    /// The bundle is missing a required top-level field.
    #[error("bundle missing required field: '{field}'")]
    MissingField { field: String },
    /// A section of the bundle does not match its record shape.
    #[error("{section}: {message}")]
    SectionError { section: String, message: String },
    /// The bundle structure is invalid.
    #[error("invalid bundle: {0}")]
    InvalidBundle(String),
}

/// Deserialize a bundle document into typed structs.
///
/// `graph` is required; every other section defaults to empty. Each
/// section is decoded separately so that errors name the section that
/// failed rather than a byte offset in the whole document.
pub fn from_bundle_json(bundle: &serde_json::Value) -> Result<EstimateBundle, InterchangeError> {
    let obj = bundle
        .as_object()
        .ok_or_else(|| InterchangeError::InvalidBundle("bundle must be a JSON object".into()))?;

    let graph_val = obj.get("graph").ok_or_else(|| InterchangeError::MissingField {
        field: "graph".to_string(),
    })?;
    let graph: GraphSnapshot = section("graph", graph_val)?;

    let fact_definitions: Vec<FactDefinitionRecord> = optional_section(obj, "fact_definitions")?;
    let trees: Vec<DecisionTreeRecord> = optional_section(obj, "trees")?;
    let expressions: Vec<ExpressionRecord> = optional_section(obj, "expressions")?;
    let variable_bindings: BTreeMap<String, i64> = optional_section(obj, "variable_bindings")?;

    check_unique_ids("graph.nodes", graph.nodes.iter().map(|n| n.id))?;
    check_unique_ids("trees", trees.iter().map(|t| t.id))?;
    check_unique_ids("expressions", expressions.iter().map(|e| e.id))?;

    Ok(EstimateBundle {
        graph,
        fact_definitions,
        library: TreeLibrarySnapshot {
            trees,
            expressions,
            variable_bindings,
        },
    })
}

// ── Parsing helpers ─────────────────────────────────────────────────

fn section<T: DeserializeOwned>(
    name: &str,
    value: &serde_json::Value,
) -> Result<T, InterchangeError> {
    serde_json::from_value(value.clone()).map_err(|e| InterchangeError::SectionError {
        section: name.to_string(),
        message: e.to_string(),
    })
}

fn optional_section<T: DeserializeOwned + Default>(
    obj: &serde_json::Map<String, serde_json::Value>,
    name: &str,
) -> Result<T, InterchangeError> {
    match obj.get(name) {
        None | Some(serde_json::Value::Null) => Ok(T::default()),
        Some(v) => section(name, v),
    }
}

fn check_unique_ids(
    section: &str,
    ids: impl Iterator<Item = i64>,
) -> Result<(), InterchangeError> {
    let mut seen = std::collections::BTreeSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(InterchangeError::SectionError {
                section: section.to_string(),
                message: format!("duplicate id {}", id),
            });
        }
    }
    Ok(())
}
