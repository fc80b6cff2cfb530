//! Per-run evaluation state.
//!
//! A [`RuntimeContext`] is created for one page computation, pricing run
//! or tree evaluation and dropped at its end. It owns the run's facts,
//! its variable bindings and the caches that keep a shared
//! sub-expression from being evaluated twice; it borrows the immutable
//! [`TreeLibrary`].
//!
//! Cache rules:
//! - `expression_cache` and `tree_cache` hold results computed under the
//!   current variable bindings.
//! - `variable_cache` holds explicit bindings (written by `var` pricing
//!   nodes) and tree-derived values (computed on first read of a bound
//!   variable). Derived entries are tracked separately.
//! - Any variable write clears both result caches and every derived
//!   entry.
//!
//! Cached results remember which facts they read, so a cache hit still
//! reports those facts to the provenance collector.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;

use crate::condition::{self, Condition};
use crate::cost::{CostBreakdown, EvalValue};
use crate::error::EvalError;
use crate::expr::{CompareOp, ExprIndex, ExprNode};
use crate::fact::{FactMap, FactValue};
use crate::provenance::FactCollector;
use crate::tree::{self, TreeLibrary, TreeOutcome};

#[derive(Debug, Clone)]
struct Cached<T> {
    value: T,
    facts: Vec<String>,
}

pub struct RuntimeContext<'a> {
    library: &'a TreeLibrary,
    facts: FactMap,
    expression_cache: BTreeMap<ExprIndex, Cached<EvalValue>>,
    tree_cache: BTreeMap<i64, Cached<TreeOutcome>>,
    variable_cache: BTreeMap<String, Decimal>,
    /// Variables in `variable_cache` computed from a bound tree, with the
    /// facts that computation read.
    derived: BTreeMap<String, Vec<String>>,
    /// Facts read before each explicit binding was written.
    bound_facts: BTreeMap<String, Vec<String>>,
    /// Variables currently being resolved, outermost first.
    resolving: Vec<String>,
    collector: FactCollector,
}

impl fmt::Debug for RuntimeContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("facts", &self.facts)
            .field("variables", &self.variable_cache)
            .field("cached_expressions", &self.expression_cache.len())
            .field("cached_trees", &self.tree_cache.len())
            .finish()
    }
}

impl<'a> RuntimeContext<'a> {
    pub fn new(library: &'a TreeLibrary, facts: FactMap) -> Self {
        RuntimeContext {
            library,
            facts,
            expression_cache: BTreeMap::new(),
            tree_cache: BTreeMap::new(),
            variable_cache: BTreeMap::new(),
            derived: BTreeMap::new(),
            bound_facts: BTreeMap::new(),
            resolving: Vec::new(),
            collector: FactCollector::new(),
        }
    }

    pub fn facts(&self) -> &FactMap {
        &self.facts
    }

    pub fn library(&self) -> &'a TreeLibrary {
        self.library
    }

    // ── Provenance ──────────────────────────────────────────────────

    /// Forget every fact read so far.
    pub fn begin_trace(&mut self) {
        self.collector.take();
    }

    /// Facts read since the last [`begin_trace`](Self::begin_trace).
    pub fn applied_facts(&self) -> BTreeMap<String, FactValue> {
        self.collector.applied_facts(&self.facts)
    }

    /// Run `f` with a fresh collector and return what it read, merging
    /// those reads back into the enclosing trace.
    fn traced<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, EvalError>,
    ) -> Result<(T, Vec<String>), EvalError> {
        let outer = self.collector.take();
        let result = f(self);
        let inner = self.collector.take();
        self.collector.facts_used = outer;
        self.collector.extend(&inner);
        result.map(|v| (v, inner))
    }

    // ── Facts and conditions ────────────────────────────────────────

    /// Read a fact an expression depends on. Absent facts are errors
    /// here, unlike in conditions.
    pub fn fact(&mut self, fact_key: &str) -> Result<&FactValue, EvalError> {
        self.collector.record_fact(fact_key);
        self.facts.get(fact_key).ok_or_else(|| EvalError::MissingFact {
            fact_key: fact_key.to_string(),
        })
    }

    pub fn condition(&mut self, condition: &Condition) -> Result<bool, EvalError> {
        condition::eval_condition(condition, &self.facts, &mut self.collector)
    }

    // ── Variables ───────────────────────────────────────────────────

    /// Resolve a variable: explicit binding, then a cached derived value,
    /// then the decision tree bound to it.
    pub fn variable(&mut self, key: &str) -> Result<Decimal, EvalError> {
        self.current_variable(key)?
            .ok_or_else(|| EvalError::UnknownVariable {
                key: key.to_string(),
            })
    }

    /// Like [`variable`](Self::variable), but `None` for a key with no
    /// binding of any kind.
    pub fn current_variable(&mut self, key: &str) -> Result<Option<Decimal>, EvalError> {
        if let Some(value) = self.variable_cache.get(key).copied() {
            let facts = self
                .derived
                .get(key)
                .or_else(|| self.bound_facts.get(key))
                .cloned();
            if let Some(facts) = facts {
                self.collector.extend(&facts);
            }
            return Ok(Some(value));
        }
        let Some(tree_id) = self.library.binding(key) else {
            return Ok(None);
        };

        if let Some(pos) = self.resolving.iter().position(|k| k == key) {
            let mut path: Vec<String> = self.resolving[pos..]
                .iter()
                .map(|k| format!("var {}", k))
                .collect();
            path.push(format!("var {}", key));
            return Err(EvalError::ExpressionCycle { path });
        }

        self.resolving.push(key.to_string());
        let result = self.traced(|ctx| ctx.evaluate_tree(tree_id));
        self.resolving.pop();
        let (value, facts) = result?;

        let number = match value {
            EvalValue::Scalar { value } => value,
            EvalValue::Bool { value } => {
                if value {
                    Decimal::ONE
                } else {
                    Decimal::ZERO
                }
            }
            EvalValue::Cost { .. } => {
                return Err(EvalError::type_mismatch(format!(
                    "variable '{}' is bound to tree {}, which returned a cost",
                    key, tree_id
                )))
            }
        };
        self.variable_cache.insert(key.to_string(), number);
        self.derived.insert(key.to_string(), facts);
        Ok(Some(number))
    }

    /// Bind a variable explicitly and invalidate everything computed
    /// under the previous bindings. The facts read in the current trace
    /// travel with the binding and are reported by every later read.
    pub fn set_variable(&mut self, key: &str, value: Decimal) {
        tracing::debug!(key, %value, "variable write");
        self.expression_cache.clear();
        self.tree_cache.clear();
        for derived in std::mem::take(&mut self.derived).into_keys() {
            self.variable_cache.remove(&derived);
        }
        self.bound_facts
            .insert(key.to_string(), self.collector.facts_used.clone());
        self.variable_cache.insert(key.to_string(), value);
    }

    /// Explicit bindings only; tree-derived values are excluded.
    pub fn variables(&self) -> BTreeMap<String, Decimal> {
        self.variable_cache
            .iter()
            .filter(|(k, _)| !self.derived.contains_key(*k))
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    // ── Trees and expressions ───────────────────────────────────────

    pub fn evaluate_tree(&mut self, tree_id: i64) -> Result<EvalValue, EvalError> {
        self.evaluate_tree_outcome(tree_id).map(|o| o.value)
    }

    /// Evaluate a tree, reporting which branch matched.
    pub fn evaluate_tree_outcome(&mut self, tree_id: i64) -> Result<TreeOutcome, EvalError> {
        if let Some(cached) = self.tree_cache.get(&tree_id) {
            let cached = cached.clone();
            self.collector.extend(&cached.facts);
            return Ok(cached.value);
        }
        let library = self.library;
        let decision = library.tree(tree_id)?;
        let (outcome, facts) = self.traced(|ctx| tree::eval_tree(ctx, decision))?;
        self.tree_cache.insert(
            tree_id,
            Cached {
                value: outcome.clone(),
                facts,
            },
        );
        Ok(outcome)
    }

    /// Evaluate a stored expression by id.
    pub fn eval_expression_id(&mut self, expr_id: i64) -> Result<EvalValue, EvalError> {
        let index = self.library.expression(expr_id)?;
        self.eval_expr(index)
    }

    pub fn eval_expr(&mut self, index: ExprIndex) -> Result<EvalValue, EvalError> {
        if let Some(cached) = self.expression_cache.get(&index) {
            let cached = cached.clone();
            self.collector.extend(&cached.facts);
            return Ok(cached.value);
        }
        let (value, facts) = self.traced(|ctx| ctx.eval_node(index))?;
        self.expression_cache.insert(
            index,
            Cached {
                value: value.clone(),
                facts,
            },
        );
        Ok(value)
    }

    fn eval_node(&mut self, index: ExprIndex) -> Result<EvalValue, EvalError> {
        let library = self.library;
        match library.expressions().node(index) {
            ExprNode::Number(n) => Ok(EvalValue::scalar(*n)),
            ExprNode::Boolean(b) => Ok(EvalValue::boolean(*b)),
            ExprNode::Fact(key) => fact_to_value(key, self.fact(key)?),
            ExprNode::Var(key) => Ok(EvalValue::scalar(self.variable(key)?)),
            ExprNode::Condition(condition) => Ok(EvalValue::boolean(self.condition(condition)?)),
            ExprNode::Arith {
                op,
                left,
                right,
                bucket,
            } => {
                let l = self.eval_expr(*left)?;
                let r = self.eval_expr(*right)?;
                l.combine(*op, &r, *bucket)
            }
            ExprNode::Compare { op, left, right } => {
                let l = self.eval_expr(*left)?;
                let r = self.eval_expr(*right)?;
                let ordering = match (&l, &r) {
                    (EvalValue::Bool { value: a }, EvalValue::Bool { value: b })
                        if matches!(op, CompareOp::Eq | CompareOp::Ne) =>
                    {
                        a.cmp(b)
                    }
                    (EvalValue::Bool { .. }, _) | (_, EvalValue::Bool { .. }) => {
                        return Err(EvalError::type_mismatch(format!(
                            "cannot order {} against {}",
                            l.type_name(),
                            r.type_name()
                        )))
                    }
                    _ => l.amount()?.cmp(&r.amount()?),
                };
                Ok(EvalValue::boolean(op.holds(ordering)))
            }
            ExprNode::And(left, right) => {
                if !self.eval_expr(*left)?.as_bool()? {
                    return Ok(EvalValue::boolean(false));
                }
                Ok(EvalValue::boolean(self.eval_expr(*right)?.as_bool()?))
            }
            ExprNode::Or(left, right) => {
                if self.eval_expr(*left)?.as_bool()? {
                    return Ok(EvalValue::boolean(true));
                }
                Ok(EvalValue::boolean(self.eval_expr(*right)?.as_bool()?))
            }
            ExprNode::Not(operand) => Ok(EvalValue::boolean(!self.eval_expr(*operand)?.as_bool()?)),
            ExprNode::Bucket { bucket, operand } => {
                let amount = self.eval_expr(*operand)?.amount()?;
                Ok(EvalValue::cost(CostBreakdown::in_bucket(*bucket, amount)))
            }
        }
    }
}

/// Expression view of a fact value. Text facts only take part in
/// condition nodes.
pub(crate) fn fact_to_value(key: &str, value: &FactValue) -> Result<EvalValue, EvalError> {
    match value {
        FactValue::Number(n) => Ok(EvalValue::scalar(*n)),
        FactValue::Bool(b) => Ok(EvalValue::boolean(*b)),
        FactValue::Text(_) => Err(EvalError::type_mismatch(format!(
            "fact '{}' is text and cannot be used as a number",
            key
        ))),
    }
}
