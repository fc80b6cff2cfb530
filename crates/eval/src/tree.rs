//! Decision trees (if-trees).
//!
//! A tree is an ordered list of branches. Evaluation returns the typed
//! result of the first branch whose condition holds. A branch without a
//! condition always matches, so anything ordered after it is dead. There
//! is no implicit default: if nothing matches the evaluation fails with
//! [`EvalError::NoMatchingBranch`].

use std::collections::BTreeMap;

use pricewise_interchange::{DecisionTreeRecord, TreeLibrarySnapshot};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::context::RuntimeContext;
use crate::cost::{ArithOp, Bucket, EvalValue};
use crate::error::EvalError;
use crate::expr::{ExprIndex, ExpressionArena};
use crate::fact::FactMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adjustment {
    pub order_index: i64,
    pub op: ArithOp,
    pub value_expression_id: i64,
    pub bucket: Bucket,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchReturn {
    Number(i64),
    Boolean(i64),
    /// Folded left to right from an empty accumulator.
    Adjustment(Vec<Adjustment>),
}

impl BranchReturn {
    fn expression_ids(&self) -> Vec<i64> {
        match self {
            BranchReturn::Number(id) | BranchReturn::Boolean(id) => vec![*id],
            BranchReturn::Adjustment(adjustments) => {
                adjustments.iter().map(|a| a.value_expression_id).collect()
            }
        }
    }
}

/// Branch expressions are held by stored id and resolved against the
/// library's arena when the branch is evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub order_index: i64,
    /// `None` matches unconditionally.
    pub condition_expression_id: Option<i64>,
    pub returns: BranchReturn,
}

impl Branch {
    /// Every stored expression id this branch may evaluate.
    pub fn expression_ids(&self) -> Vec<i64> {
        self.condition_expression_id
            .into_iter()
            .chain(self.returns.expression_ids())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionTree {
    pub id: i64,
    pub name: String,
    /// Sorted by `order_index`.
    pub branches: Vec<Branch>,
}

/// The branch a tree evaluation took and what it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeOutcome {
    pub tree_id: i64,
    pub order_index: i64,
    pub value: EvalValue,
}

// ──────────────────────────────────────────────
// Library
// ──────────────────────────────────────────────

/// Every decision tree of a tenant, the expression arena they evaluate
/// over, and the variables bound to them. Immutable once built.
///
/// A malformed tree or expression does not poison the library: its
/// error is kept and returned only to evaluations that reach it.
#[derive(Debug, Clone, Default)]
pub struct TreeLibrary {
    trees: BTreeMap<i64, DecisionTree>,
    broken_trees: BTreeMap<i64, EvalError>,
    expressions: ExpressionArena,
    broken_expressions: BTreeMap<i64, EvalError>,
    bindings: BTreeMap<String, i64>,
}

impl TreeLibrary {
    pub fn from_snapshot(snapshot: &TreeLibrarySnapshot) -> Self {
        let roots = snapshot.expressions.iter().map(|e| e.id);
        let (expressions, broken_expressions) =
            ExpressionArena::build_each(&snapshot.expressions, roots);

        let mut trees = BTreeMap::new();
        let mut broken_trees = BTreeMap::new();
        for record in &snapshot.trees {
            match convert_tree(record) {
                Ok(tree) => {
                    trees.insert(record.id, tree);
                }
                Err(e) => {
                    broken_trees.insert(record.id, e);
                }
            }
        }

        TreeLibrary {
            trees,
            broken_trees,
            expressions,
            broken_expressions,
            bindings: snapshot.variable_bindings.clone(),
        }
    }

    pub fn tree(&self, tree_id: i64) -> Result<&DecisionTree, EvalError> {
        if let Some(e) = self.broken_trees.get(&tree_id) {
            return Err(e.clone());
        }
        self.trees
            .get(&tree_id)
            .ok_or(EvalError::TreeNotFound { tree_id })
    }

    /// Trees that loaded cleanly, ascending by id.
    pub fn trees(&self) -> impl Iterator<Item = &DecisionTree> {
        self.trees.values()
    }

    /// Trees whose records could not be converted, with the reason.
    pub fn broken_trees(&self) -> impl Iterator<Item = (i64, &EvalError)> {
        self.broken_trees.iter().map(|(id, e)| (*id, e))
    }

    pub fn expressions(&self) -> &ExpressionArena {
        &self.expressions
    }

    /// Resolve a stored expression id to its arena slot.
    pub fn expression(&self, expr_id: i64) -> Result<ExprIndex, EvalError> {
        if let Some(index) = self.expressions.index_of(expr_id) {
            return Ok(index);
        }
        match self.broken_expressions.get(&expr_id) {
            Some(e) => Err(e.clone()),
            None => Err(EvalError::ExpressionNotFound { expr_id }),
        }
    }

    /// Stored expressions that failed to convert, with the reason.
    pub fn broken_expressions(&self) -> impl Iterator<Item = (i64, &EvalError)> {
        self.broken_expressions.iter().map(|(id, e)| (*id, e))
    }

    /// The tree bound to `var_key`, if any.
    pub fn binding(&self, var_key: &str) -> Option<i64> {
        self.bindings.get(var_key).copied()
    }

    pub fn bindings(&self) -> &BTreeMap<String, i64> {
        &self.bindings
    }

    /// Whether a tree with this id was stored at all, broken or not.
    pub fn contains_tree(&self, tree_id: i64) -> bool {
        self.trees.contains_key(&tree_id) || self.broken_trees.contains_key(&tree_id)
    }
}

fn convert_tree(record: &DecisionTreeRecord) -> Result<DecisionTree, EvalError> {
    let ctx = format!("tree {}", record.id);

    let mut branches = Vec::with_capacity(record.branches.len());
    for branch in &record.branches {
        let value_expr = || {
            branch.returns.value_expression_id.ok_or_else(|| {
                EvalError::malformed(format!(
                    "{} branch {}: '{}' return needs value_expression_id",
                    ctx, branch.order_index, branch.returns.kind
                ))
            })
        };
        let returns = match branch.returns.kind.as_str() {
            "number" => BranchReturn::Number(value_expr()?),
            "boolean" => BranchReturn::Boolean(value_expr()?),
            "adjustment" => {
                let mut adjustments = branch
                    .returns
                    .adjustments
                    .iter()
                    .map(|a| {
                        Ok(Adjustment {
                            order_index: a.order_index,
                            op: ArithOp::parse(&a.operation).ok_or_else(|| {
                                EvalError::malformed(format!(
                                    "{} branch {}: unknown adjustment operation '{}'",
                                    ctx, branch.order_index, a.operation
                                ))
                            })?,
                            value_expression_id: a.value_expression_id,
                            bucket: Bucket::parse_optional(a.bucket.as_deref(), &ctx)?,
                        })
                    })
                    .collect::<Result<Vec<_>, EvalError>>()?;
                adjustments.sort_by_key(|a| a.order_index);
                BranchReturn::Adjustment(adjustments)
            }
            other => {
                return Err(EvalError::malformed(format!(
                    "{} branch {}: unknown return kind '{}'",
                    ctx, branch.order_index, other
                )))
            }
        };
        branches.push(Branch {
            order_index: branch.order_index,
            condition_expression_id: branch.condition_expression_id,
            returns,
        });
    }
    branches.sort_by_key(|b| b.order_index);

    Ok(DecisionTree {
        id: record.id,
        name: record.name.clone(),
        branches,
    })
}

// ──────────────────────────────────────────────
// Evaluation
// ──────────────────────────────────────────────

/// Evaluate a tree against facts with a fresh context.
pub fn evaluate_decision_tree(
    library: &TreeLibrary,
    tree_id: i64,
    facts: FactMap,
) -> Result<EvalValue, EvalError> {
    RuntimeContext::new(library, facts).evaluate_tree(tree_id)
}

/// Walk branches in order and resolve the first match.
pub(crate) fn eval_tree(
    ctx: &mut RuntimeContext<'_>,
    tree: &DecisionTree,
) -> Result<TreeOutcome, EvalError> {
    for branch in &tree.branches {
        let matched = match branch.condition_expression_id {
            None => true,
            Some(condition) => ctx.eval_expression_id(condition)?.as_bool()?,
        };
        if !matched {
            continue;
        }
        tracing::trace!(tree_id = tree.id, order_index = branch.order_index, "branch matched");
        let value = match &branch.returns {
            BranchReturn::Number(expr) => {
                EvalValue::scalar(ctx.eval_expression_id(*expr)?.as_scalar()?)
            }
            BranchReturn::Boolean(expr) => {
                EvalValue::boolean(ctx.eval_expression_id(*expr)?.as_bool()?)
            }
            BranchReturn::Adjustment(adjustments) => {
                let mut acc = None;
                for adjustment in adjustments {
                    let step = ctx.eval_expression_id(adjustment.value_expression_id)?;
                    acc = Some(EvalValue::accumulate(
                        acc,
                        adjustment.op,
                        &step,
                        adjustment.bucket,
                    )?);
                }
                acc.unwrap_or_else(|| EvalValue::scalar(Decimal::ZERO))
            }
        };
        return Ok(TreeOutcome {
            tree_id: tree.id,
            order_index: branch.order_index,
            value,
        });
    }
    Err(EvalError::NoMatchingBranch { tree_id: tree.id })
}
