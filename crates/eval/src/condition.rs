//! Condition trees: visibility rules, edge conditions and `applies_if`.
//!
//! Conditions are parsed from their stored JSON once, when a graph is
//! loaded, into the closed [`Condition`] enum. Evaluation is then a pure
//! walk over the enum against a [`FactMap`].
//!
//! Supported shapes (one key per object):
//!
//! ```text
//! null | {}                              always true
//! {"and": [c, ...]}                      all children, short-circuit
//! {"or":  [c, ...]}                      any child, short-circuit
//! {"equals": {"fact": k, "value": v}}    strict equality
//! {"gt":     {"fact": k, "value": n}}
//! {"lt":     {"fact": k, "value": n}}
//! {"in":     {"fact": k, "values": [v, ...]}}
//! ```

use std::collections::BTreeSet;

use rust_decimal::Decimal;

use crate::error::EvalError;
use crate::fact::{FactMap, FactValue};
use crate::numeric;
use crate::provenance::FactCollector;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Condition {
    #[default]
    Always,
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Equals { fact: String, value: FactValue },
    Gt { fact: String, value: Decimal },
    Lt { fact: String, value: Decimal },
    In { fact: String, values: Vec<FactValue> },
}

impl Condition {
    /// Parse a stored condition tree. Unknown shapes are rejected with
    /// the offending JSON attached, never treated as true or false.
    pub fn parse(v: &serde_json::Value) -> Result<Condition, EvalError> {
        let obj = match v {
            serde_json::Value::Null => return Ok(Condition::Always),
            serde_json::Value::Object(obj) => obj,
            _ => return Err(unsupported(v)),
        };
        if obj.is_empty() {
            return Ok(Condition::Always);
        }
        if obj.len() != 1 {
            return Err(unsupported(v));
        }
        let (key, payload) = obj.iter().next().ok_or_else(|| unsupported(v))?;

        match key.as_str() {
            "and" | "or" => {
                let children = payload
                    .as_array()
                    .ok_or_else(|| unsupported(v))?
                    .iter()
                    .map(Condition::parse)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(if key == "and" {
                    Condition::And(children)
                } else {
                    Condition::Or(children)
                })
            }
            "equals" => Ok(Condition::Equals {
                fact: fact_key(payload, v)?,
                value: payload
                    .get("value")
                    .and_then(literal)
                    .ok_or_else(|| unsupported(v))?,
            }),
            "gt" | "lt" => {
                let fact = fact_key(payload, v)?;
                let value = payload
                    .get("value")
                    .and_then(numeric::decimal_from_json)
                    .ok_or_else(|| unsupported(v))?;
                Ok(if key == "gt" {
                    Condition::Gt { fact, value }
                } else {
                    Condition::Lt { fact, value }
                })
            }
            "in" => {
                let fact = fact_key(payload, v)?;
                let values = payload
                    .get("values")
                    .and_then(|vs| vs.as_array())
                    .ok_or_else(|| unsupported(v))?
                    .iter()
                    .map(|item| literal(item).ok_or_else(|| unsupported(v)))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Condition::In { fact, values })
            }
            _ => Err(unsupported(v)),
        }
    }

    pub fn is_always(&self) -> bool {
        matches!(self, Condition::Always)
    }

    /// Every fact key this condition can read.
    pub fn fact_keys(&self, out: &mut BTreeSet<String>) {
        match self {
            Condition::Always => {}
            Condition::And(children) | Condition::Or(children) => {
                for c in children {
                    c.fact_keys(out);
                }
            }
            Condition::Equals { fact, .. }
            | Condition::Gt { fact, .. }
            | Condition::Lt { fact, .. }
            | Condition::In { fact, .. } => {
                out.insert(fact.clone());
            }
        }
    }
}

fn unsupported(node: &serde_json::Value) -> EvalError {
    EvalError::UnsupportedCondition {
        node: node.to_string(),
    }
}

fn fact_key(payload: &serde_json::Value, node: &serde_json::Value) -> Result<String, EvalError> {
    payload
        .get("fact")
        .and_then(|f| f.as_str())
        .map(str::to_string)
        .ok_or_else(|| unsupported(node))
}

fn literal(v: &serde_json::Value) -> Option<FactValue> {
    match v {
        serde_json::Value::Bool(b) => Some(FactValue::Bool(*b)),
        serde_json::Value::Number(_) => numeric::decimal_from_json(v).map(FactValue::Number),
        serde_json::Value::String(s) => Some(FactValue::Text(s.clone())),
        _ => None,
    }
}

// ──────────────────────────────────────────────
// Evaluation
// ──────────────────────────────────────────────

/// Evaluate a condition against facts.
pub fn evaluate(condition: &Condition, facts: &FactMap) -> Result<bool, EvalError> {
    eval_condition(condition, facts, &mut FactCollector::new())
}

/// Evaluate a condition, recording every fact key it reads.
///
/// A leaf whose fact is absent is false: pages are computed over partial
/// answers. A present fact of the wrong kind for `gt`/`lt` is an error.
pub fn eval_condition(
    condition: &Condition,
    facts: &FactMap,
    collector: &mut FactCollector,
) -> Result<bool, EvalError> {
    match condition {
        Condition::Always => Ok(true),
        Condition::And(children) => {
            for child in children {
                if !eval_condition(child, facts, collector)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Condition::Or(children) => {
            for child in children {
                if eval_condition(child, facts, collector)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Condition::Equals { fact, value } => {
            collector.record_fact(fact);
            Ok(facts.get(fact) == Some(value))
        }
        Condition::Gt { fact, value } => {
            collector.record_fact(fact);
            Ok(numeric_fact(facts, fact, "gt")?.map_or(false, |n| n > *value))
        }
        Condition::Lt { fact, value } => {
            collector.record_fact(fact);
            Ok(numeric_fact(facts, fact, "lt")?.map_or(false, |n| n < *value))
        }
        Condition::In { fact, values } => {
            collector.record_fact(fact);
            Ok(facts.get(fact).map_or(false, |v| values.contains(v)))
        }
    }
}

fn numeric_fact(facts: &FactMap, fact: &str, op: &str) -> Result<Option<Decimal>, EvalError> {
    match facts.get(fact) {
        None => Ok(None),
        Some(FactValue::Number(n)) => Ok(Some(*n)),
        Some(other) => Err(EvalError::type_mismatch(format!(
            "'{}' compares numbers, but fact '{}' is {}",
            op,
            fact,
            other.type_name()
        ))),
    }
}
