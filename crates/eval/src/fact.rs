//! Fact definitions, typed fact values and coercion of raw inputs.
//!
//! Every fact key read by a condition or expression is declared by a
//! [`FactDefinition`]. Raw JSON answers are coerced against the
//! declaration once, when a [`FactMap`] is assembled; evaluators only
//! ever see typed [`FactValue`]s.

use std::collections::BTreeMap;
use std::fmt;

use pricewise_interchange::FactDefinitionRecord;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};

use crate::error::EvalError;
use crate::numeric;

/// A coerced fact value. Enum and string facts are both `Text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactValue {
    Bool(bool),
    Number(Decimal),
    Text(String),
}

impl FactValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            FactValue::Bool(_) => "boolean",
            FactValue::Number(_) => "number",
            FactValue::Text(_) => "text",
        }
    }

    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            FactValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// JSON form: integral numbers become JSON integers, other numbers
    /// JSON floats when they round-trip, decimal strings otherwise.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FactValue::Bool(b) => serde_json::Value::Bool(*b),
            FactValue::Text(s) => serde_json::Value::String(s.clone()),
            FactValue::Number(n) => number_to_json(*n),
        }
    }

    /// Inverse of [`FactValue::to_json`] for scalar JSON values.
    pub fn from_json(value: &serde_json::Value) -> Option<FactValue> {
        match value {
            serde_json::Value::Bool(b) => Some(FactValue::Bool(*b)),
            serde_json::Value::Number(_) => numeric::decimal_from_json(value).map(FactValue::Number),
            serde_json::Value::String(s) => Some(FactValue::Text(s.clone())),
            _ => None,
        }
    }
}

fn number_to_json(n: Decimal) -> serde_json::Value {
    let n = n.normalize();
    if n.is_integer() {
        if let Some(i) = n.to_i64() {
            return serde_json::Value::from(i);
        }
    }
    match n.to_f64().and_then(serde_json::Number::from_f64) {
        Some(f) if numeric::parse_decimal(&f.to_string()) == Some(n) => serde_json::Value::Number(f),
        _ => serde_json::Value::String(n.to_string()),
    }
}

impl fmt::Display for FactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactValue::Bool(b) => write!(f, "{}", b),
            FactValue::Number(n) => write!(f, "{}", n.normalize()),
            FactValue::Text(s) => f.write_str(s),
        }
    }
}

impl Serialize for FactValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

// ──────────────────────────────────────────────
// Definitions
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactType {
    Boolean,
    Number,
    String,
    Enum,
    /// A stored type this engine does not know. Coercing the fact fails;
    /// the rest of the catalog is unaffected.
    Unsupported(String),
}

impl FactType {
    pub fn parse(raw: &str) -> FactType {
        match raw {
            "boolean" | "bool" => FactType::Boolean,
            "number" => FactType::Number,
            "string" | "text" => FactType::String,
            "enum" => FactType::Enum,
            other => FactType::Unsupported(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactDefinition {
    pub fact_key: String,
    pub fact_type: FactType,
    /// Allowed values for enum facts. `None` accepts any value.
    pub options: Option<Vec<String>>,
}

impl FactDefinition {
    /// Coerce a raw JSON answer into a typed value.
    pub fn coerce(&self, raw: &serde_json::Value) -> Result<FactValue, EvalError> {
        use serde_json::Value as J;

        let invalid = |expected: &str| EvalError::InvalidFactValue {
            fact_key: self.fact_key.clone(),
            expected: expected.to_string(),
            got: raw.to_string(),
        };

        match &self.fact_type {
            FactType::Unsupported(fact_type) => Err(EvalError::UnsupportedFactType {
                fact_key: self.fact_key.clone(),
                fact_type: fact_type.clone(),
            }),
            FactType::Boolean => match raw {
                J::Bool(b) => Ok(FactValue::Bool(*b)),
                J::String(s) if s == "true" => Ok(FactValue::Bool(true)),
                J::String(s) if s == "false" => Ok(FactValue::Bool(false)),
                _ => Err(invalid("boolean")),
            },
            FactType::Number => match raw {
                J::Number(_) | J::String(_) => numeric::decimal_from_json(raw)
                    .map(FactValue::Number)
                    .ok_or_else(|| invalid("finite number")),
                _ => Err(invalid("finite number")),
            },
            FactType::String => Ok(FactValue::Text(stringify(raw))),
            FactType::Enum => {
                if raw.is_null() {
                    return Err(invalid("non-null enum value"));
                }
                let value = stringify(raw);
                if let Some(options) = &self.options {
                    if !options.contains(&value) {
                        return Err(EvalError::InvalidEnumValue {
                            fact_key: self.fact_key.clone(),
                            value,
                            options: options.clone(),
                        });
                    }
                }
                Ok(FactValue::Text(value))
            }
        }
    }
}

fn stringify(raw: &serde_json::Value) -> String {
    match raw {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// All fact definitions known to a tenant, keyed by fact key.
#[derive(Debug, Clone, Default)]
pub struct FactCatalog {
    definitions: BTreeMap<String, FactDefinition>,
}

impl FactCatalog {
    pub fn from_records(records: &[FactDefinitionRecord]) -> Self {
        let definitions = records
            .iter()
            .map(|record| {
                (
                    record.fact_key.clone(),
                    FactDefinition {
                        fact_key: record.fact_key.clone(),
                        fact_type: FactType::parse(&record.fact_type),
                        options: record.options.clone(),
                    },
                )
            })
            .collect();
        FactCatalog { definitions }
    }

    pub fn get(&self, fact_key: &str) -> Option<&FactDefinition> {
        self.definitions.get(fact_key)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Coerce one raw value. Undeclared keys are never guessed.
    pub fn coerce(&self, fact_key: &str, raw: &serde_json::Value) -> Result<FactValue, EvalError> {
        self.get(fact_key)
            .ok_or_else(|| EvalError::UnknownFactDefinition {
                fact_key: fact_key.to_string(),
            })?
            .coerce(raw)
    }
}

// ──────────────────────────────────────────────
// FactMap
// ──────────────────────────────────────────────

/// Coerced facts for one evaluation, keyed by fact key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FactMap {
    facts: BTreeMap<String, FactValue>,
}

impl FactMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, fact_key: &str) -> Option<&FactValue> {
        self.facts.get(fact_key)
    }

    pub fn insert(&mut self, fact_key: impl Into<String>, value: FactValue) -> Option<FactValue> {
        self.facts.insert(fact_key.into(), value)
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FactValue)> {
        self.facts.iter()
    }
}

impl<K: Into<String>> FromIterator<(K, FactValue)> for FactMap {
    fn from_iter<I: IntoIterator<Item = (K, FactValue)>>(iter: I) -> Self {
        FactMap {
            facts: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Coerce a JSON object of raw answers into a [`FactMap`].
///
/// `null` for the whole document means "no answers yet".
pub fn assemble_facts(
    catalog: &FactCatalog,
    raw: &serde_json::Value,
) -> Result<FactMap, EvalError> {
    let obj = match raw {
        serde_json::Value::Null => return Ok(FactMap::new()),
        serde_json::Value::Object(obj) => obj,
        other => {
            return Err(EvalError::type_mismatch(format!(
                "facts must be a JSON object, got {}",
                other
            )))
        }
    };

    let mut facts = FactMap::new();
    for (key, value) in obj {
        facts.insert(key.clone(), catalog.coerce(key, value)?);
    }
    Ok(facts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog() -> FactCatalog {
        let records: Vec<FactDefinitionRecord> = serde_json::from_value(json!([
            { "fact_key": "has_permit", "fact_type": "boolean" },
            { "fact_key": "sqft", "fact_type": "number" },
            { "fact_key": "notes", "fact_type": "string" },
            { "fact_key": "pitch", "fact_type": "enum", "options": ["low", "steep"] },
            { "fact_key": "color", "fact_type": "enum" }
        ]))
        .unwrap();
        FactCatalog::from_records(&records)
    }

    #[test]
    fn boolean_accepts_bools_and_literal_strings() {
        let c = catalog();
        assert_eq!(c.coerce("has_permit", &json!(true)).unwrap(), FactValue::Bool(true));
        assert_eq!(c.coerce("has_permit", &json!("false")).unwrap(), FactValue::Bool(false));
        assert!(matches!(
            c.coerce("has_permit", &json!("yes")),
            Err(EvalError::InvalidFactValue { .. })
        ));
        assert!(matches!(
            c.coerce("has_permit", &json!(1)),
            Err(EvalError::InvalidFactValue { .. })
        ));
    }

    #[test]
    fn number_accepts_numeric_strings() {
        let c = catalog();
        assert_eq!(
            c.coerce("sqft", &json!(1500)).unwrap(),
            FactValue::Number(Decimal::from(1500))
        );
        assert_eq!(
            c.coerce("sqft", &json!(" 2.5e3 ")).unwrap(),
            FactValue::Number(Decimal::from(2500))
        );
        assert!(matches!(
            c.coerce("sqft", &json!("NaN")),
            Err(EvalError::InvalidFactValue { .. })
        ));
        assert!(matches!(
            c.coerce("sqft", &json!(null)),
            Err(EvalError::InvalidFactValue { .. })
        ));
    }

    #[test]
    fn string_coerces_anything() {
        let c = catalog();
        assert_eq!(c.coerce("notes", &json!(null)).unwrap(), FactValue::Text(String::new()));
        assert_eq!(c.coerce("notes", &json!(12)).unwrap(), FactValue::Text("12".into()));
        assert_eq!(c.coerce("notes", &json!("hi")).unwrap(), FactValue::Text("hi".into()));
    }

    #[test]
    fn enum_requires_value_within_options() {
        let c = catalog();
        assert_eq!(c.coerce("pitch", &json!("steep")).unwrap(), FactValue::Text("steep".into()));
        assert!(matches!(
            c.coerce("pitch", &json!("flat")),
            Err(EvalError::InvalidEnumValue { .. })
        ));
        assert!(matches!(
            c.coerce("pitch", &json!(null)),
            Err(EvalError::InvalidFactValue { .. })
        ));
        assert_eq!(c.coerce("color", &json!(3)).unwrap(), FactValue::Text("3".into()));
    }

    #[test]
    fn unknown_key_is_rejected() {
        let c = catalog();
        assert_eq!(
            c.coerce("nope", &json!(1)).unwrap_err(),
            EvalError::UnknownFactDefinition {
                fact_key: "nope".into()
            }
        );
    }

    #[test]
    fn unsupported_type_fails_only_its_own_key() {
        let records = vec![
            FactDefinitionRecord {
                fact_key: "sqft".into(),
                fact_type: "number".into(),
                options: None,
            },
            FactDefinitionRecord {
                fact_key: "install_date".into(),
                fact_type: "date".into(),
                options: None,
            },
        ];
        let c = FactCatalog::from_records(&records);
        assert_eq!(
            c.coerce("sqft", &json!(1500)).unwrap(),
            FactValue::Number(Decimal::from(1500))
        );
        assert_eq!(
            c.coerce("install_date", &json!("2024-05-01")).unwrap_err(),
            EvalError::UnsupportedFactType {
                fact_key: "install_date".into(),
                fact_type: "date".into()
            }
        );
        assert_eq!(
            c.get("install_date").map(|d| &d.fact_type),
            Some(&FactType::Unsupported("date".into()))
        );
    }

    #[test]
    fn assemble_coerces_every_key() {
        let facts = assemble_facts(&catalog(), &json!({ "sqft": "1500", "pitch": "low" })).unwrap();
        assert_eq!(facts.len(), 2);
        assert_eq!(facts.get("sqft"), Some(&FactValue::Number(Decimal::from(1500))));

        assert!(assemble_facts(&catalog(), &json!(null)).unwrap().is_empty());
        assert!(assemble_facts(&catalog(), &json!([1])).is_err());
        assert!(assemble_facts(&catalog(), &json!({ "other": 1 })).is_err());
    }

    #[test]
    fn json_form_round_trips() {
        for value in [
            FactValue::Bool(true),
            FactValue::Number(Decimal::from(1500)),
            FactValue::Number(Decimal::new(125, 1)),
            FactValue::Text("roof".into()),
        ] {
            assert_eq!(FactValue::from_json(&value.to_json()), Some(value));
        }
        assert_eq!(FactValue::Number(Decimal::new(15000, 1)).to_json(), json!(1500));
    }
}
