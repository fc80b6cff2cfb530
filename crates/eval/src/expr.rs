//! Stored expression nodes, converted into an index-addressed arena.
//!
//! Expression records reference their children by id. The arena is
//! built by a closure traversal from a set of root ids: every reachable
//! record is converted exactly once, children before parents, and each
//! [`ExprNode`] refers to its children by [`ExprIndex`]. A reference
//! cycle or a dangling child id fails the build.

use std::collections::BTreeMap;

use pricewise_interchange::ExpressionRecord;
use rust_decimal::Decimal;

use crate::condition::Condition;
use crate::cost::{ArithOp, Bucket};
use crate::error::EvalError;
use crate::numeric;

/// Position of a node inside an [`ExpressionArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExprIndex(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    pub fn parse(raw: &str) -> Option<CompareOp> {
        match raw {
            "=" | "==" => Some(CompareOp::Eq),
            "!=" => Some(CompareOp::Ne),
            ">" => Some(CompareOp::Gt),
            ">=" => Some(CompareOp::Ge),
            "<" => Some(CompareOp::Lt),
            "<=" => Some(CompareOp::Le),
            _ => None,
        }
    }

    pub fn holds(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CompareOp::Eq => ordering == Equal,
            CompareOp::Ne => ordering != Equal,
            CompareOp::Gt => ordering == Greater,
            CompareOp::Ge => ordering != Less,
            CompareOp::Lt => ordering == Less,
            CompareOp::Le => ordering != Greater,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprNode {
    Number(Decimal),
    Boolean(bool),
    Fact(String),
    Var(String),
    /// A condition tree evaluated to a boolean.
    Condition(Condition),
    Arith {
        op: ArithOp,
        left: ExprIndex,
        right: ExprIndex,
        bucket: Bucket,
    },
    Compare {
        op: CompareOp,
        left: ExprIndex,
        right: ExprIndex,
    },
    And(ExprIndex, ExprIndex),
    Or(ExprIndex, ExprIndex),
    Not(ExprIndex),
    /// Lift the operand into a cost breakdown in `bucket`.
    Bucket { bucket: Bucket, operand: ExprIndex },
}

#[derive(Debug, Clone)]
struct ArenaEntry {
    id: i64,
    node: ExprNode,
}

#[derive(Debug, Clone, Default)]
pub struct ExpressionArena {
    entries: Vec<ArenaEntry>,
    by_id: BTreeMap<i64, ExprIndex>,
}

impl ExpressionArena {
    /// Convert every record reachable from `roots`.
    pub fn build(
        records: &[ExpressionRecord],
        roots: impl IntoIterator<Item = i64>,
    ) -> Result<Self, EvalError> {
        let records: BTreeMap<i64, &ExpressionRecord> = records.iter().map(|r| (r.id, r)).collect();
        let mut arena = ExpressionArena::default();
        let mut stack = Vec::new();
        for root in roots {
            arena.intern(root, &records, &mut stack)?;
        }
        Ok(arena)
    }

    /// Convert each root on its own. A root that fails is reported in the
    /// returned map and leaves the others untouched; children converted
    /// before the failure stay in the arena.
    pub fn build_each(
        records: &[ExpressionRecord],
        roots: impl IntoIterator<Item = i64>,
    ) -> (Self, BTreeMap<i64, EvalError>) {
        let records: BTreeMap<i64, &ExpressionRecord> = records.iter().map(|r| (r.id, r)).collect();
        let mut arena = ExpressionArena::default();
        let mut failures = BTreeMap::new();
        let mut stack = Vec::new();
        for root in roots {
            stack.clear();
            if let Err(e) = arena.intern(root, &records, &mut stack) {
                failures.insert(root, e);
            }
        }
        (arena, failures)
    }

    pub fn index_of(&self, id: i64) -> Option<ExprIndex> {
        self.by_id.get(&id).copied()
    }

    pub fn node(&self, index: ExprIndex) -> &ExprNode {
        &self.entries[index.0].node
    }

    /// Stored id of the record a node came from.
    pub fn id_of(&self, index: ExprIndex) -> i64 {
        self.entries[index.0].id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn intern(
        &mut self,
        id: i64,
        records: &BTreeMap<i64, &ExpressionRecord>,
        stack: &mut Vec<i64>,
    ) -> Result<ExprIndex, EvalError> {
        if let Some(index) = self.index_of(id) {
            return Ok(index);
        }
        if let Some(pos) = stack.iter().position(|s| *s == id) {
            let mut path: Vec<String> = stack[pos..].iter().map(|s| format!("expr {}", s)).collect();
            path.push(format!("expr {}", id));
            return Err(EvalError::ExpressionCycle { path });
        }
        let record = *records
            .get(&id)
            .ok_or(EvalError::ExpressionNotFound { expr_id: id })?;

        stack.push(id);
        let node = self.convert(record, records, stack)?;
        stack.pop();

        let index = ExprIndex(self.entries.len());
        self.entries.push(ArenaEntry { id, node });
        self.by_id.insert(id, index);
        Ok(index)
    }

    fn convert(
        &mut self,
        record: &ExpressionRecord,
        records: &BTreeMap<i64, &ExpressionRecord>,
        stack: &mut Vec<i64>,
    ) -> Result<ExprNode, EvalError> {
        let ctx = format!("expression {}", record.id);
        let op = record.op.as_str();

        let mut child = |slot: Option<i64>, name: &str| -> Result<ExprIndex, EvalError> {
            let child_id = slot.ok_or_else(|| {
                EvalError::malformed(format!("{}: '{}' requires {}", ctx, op, name))
            })?;
            self.intern(child_id, records, stack)
        };

        if let Some(arith) = ArithOp::parse(op) {
            let left = child(record.left_child_id, "left_child_id")?;
            let right = child(record.right_child_id, "right_child_id")?;
            let bucket = Bucket::parse_optional(record.bucket.as_deref(), &ctx)?;
            return Ok(ExprNode::Arith {
                op: arith,
                left,
                right,
                bucket,
            });
        }
        if let Some(cmp) = CompareOp::parse(op) {
            let left = child(record.left_child_id, "left_child_id")?;
            let right = child(record.right_child_id, "right_child_id")?;
            return Ok(ExprNode::Compare {
                op: cmp,
                left,
                right,
            });
        }

        match op {
            "and" | "or" => {
                let left = child(record.left_child_id, "left_child_id")?;
                let right = child(record.right_child_id, "right_child_id")?;
                Ok(if op == "and" {
                    ExprNode::And(left, right)
                } else {
                    ExprNode::Or(left, right)
                })
            }
            "not" => Ok(ExprNode::Not(child(record.left_child_id, "left_child_id")?)),
            "bucket" => {
                let operand = child(record.left_child_id, "left_child_id")?;
                let bucket = record
                    .bucket
                    .as_deref()
                    .and_then(Bucket::parse)
                    .ok_or_else(|| {
                        EvalError::malformed(format!("{}: 'bucket' requires a valid bucket", ctx))
                    })?;
                Ok(ExprNode::Bucket { bucket, operand })
            }
            "number" | "constant" => record
                .literal
                .as_ref()
                .and_then(numeric::decimal_from_json)
                .map(ExprNode::Number)
                .ok_or_else(|| EvalError::malformed(format!("{}: numeric literal required", ctx))),
            "boolean" => record
                .literal
                .as_ref()
                .and_then(|l| l.as_bool())
                .map(ExprNode::Boolean)
                .ok_or_else(|| EvalError::malformed(format!("{}: boolean literal required", ctx))),
            "fact" => record
                .fact_key
                .clone()
                .map(ExprNode::Fact)
                .ok_or_else(|| EvalError::malformed(format!("{}: 'fact' requires fact_key", ctx))),
            "var" | "variable" => record
                .var_key
                .clone()
                .map(ExprNode::Var)
                .ok_or_else(|| EvalError::malformed(format!("{}: 'var' requires var_key", ctx))),
            "condition" => {
                let literal = record.literal.as_ref().ok_or_else(|| {
                    EvalError::malformed(format!("{}: 'condition' requires a literal tree", ctx))
                })?;
                Ok(ExprNode::Condition(Condition::parse(literal)?))
            }
            other => Err(EvalError::malformed(format!("{}: unknown op '{}'", ctx, other))),
        }
    }
}
