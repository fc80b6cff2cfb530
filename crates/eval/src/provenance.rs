//! Tracking which facts an evaluation read.
//!
//! Each emitted cost line item carries the facts that influenced it
//! (`applied_facts`). The collector is threaded through condition and
//! expression evaluation and reset between pricing nodes.

use std::collections::BTreeMap;

use crate::fact::{FactMap, FactValue};

/// Collector that tracks fact references during evaluation.
#[derive(Debug, Clone, Default)]
pub struct FactCollector {
    pub facts_used: Vec<String>,
}

impl FactCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fact reference access.
    pub fn record_fact(&mut self, fact_key: &str) {
        if !self.facts_used.iter().any(|f| f == fact_key) {
            self.facts_used.push(fact_key.to_string());
        }
    }

    pub fn extend(&mut self, fact_keys: &[String]) {
        for key in fact_keys {
            self.record_fact(key);
        }
    }

    /// Take the recorded keys, leaving the collector empty.
    pub fn take(&mut self) -> Vec<String> {
        std::mem::take(&mut self.facts_used)
    }

    /// Resolve the recorded keys against `facts`. Keys that were read
    /// but never provided are left out.
    pub fn applied_facts(&self, facts: &FactMap) -> BTreeMap<String, FactValue> {
        self.facts_used
            .iter()
            .filter_map(|k| facts.get(k).map(|v| (k.clone(), v.clone())))
            .collect()
    }
}
