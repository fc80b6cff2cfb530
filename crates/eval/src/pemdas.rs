//! Line-based (PEMDAS) pricing expressions.
//!
//! A graph is a set of named lines with one entry line. Each line is an
//! ordered list of nodes evaluated left to right into an accumulator;
//! every node carries the operator applied *before* its own value is
//! folded in. The accumulator starts empty and is seeded by the first
//! node with the identity of that node's operator.
//!
//! A node with `target_line_id` contributes the result of the target
//! line, evaluated as a call; the current line then continues. A line
//! that is already on the call stack is a cycle.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::context::RuntimeContext;
use crate::cost::{ArithOp, Bucket, CostBreakdown, EvalValue};
use crate::error::EvalError;
use crate::numeric;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PemdasKind {
    Variable,
    Constant,
    /// The value of a stored expression node.
    ContributorNode,
    /// A value placed directly into a cost bucket.
    ContributorBucket,
}

impl PemdasKind {
    fn parse(raw: &str) -> Option<PemdasKind> {
        match raw {
            "variable" => Some(PemdasKind::Variable),
            "constant" => Some(PemdasKind::Constant),
            "contributor-node" | "contributor_node" => Some(PemdasKind::ContributorNode),
            "contributor-bucket" | "contributor_bucket" => Some(PemdasKind::ContributorBucket),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PemdasNode {
    pub kind: PemdasKind,
    pub operand: ArithOp,
    pub value: Option<Decimal>,
    pub var_key: Option<String>,
    pub expression_id: Option<i64>,
    pub bucket: Bucket,
    pub target_line_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PemdasGraph {
    pub entry: String,
    pub lines: BTreeMap<String, Vec<PemdasNode>>,
}

#[derive(Deserialize)]
struct RawGraph {
    entry: String,
    #[serde(default)]
    lines: BTreeMap<String, Vec<RawNode>>,
}

#[derive(Deserialize)]
struct RawNode {
    kind: String,
    #[serde(default)]
    operand: Option<String>,
    #[serde(default)]
    value: Option<serde_json::Value>,
    #[serde(default)]
    var_key: Option<String>,
    #[serde(default)]
    expression_id: Option<i64>,
    #[serde(default)]
    bucket: Option<String>,
    #[serde(default)]
    target_line_id: Option<String>,
}

impl PemdasGraph {
    /// Parse a `{"entry": .., "lines": {..}}` document.
    ///
    /// Node shapes are checked here. Jump targets and the entry line are
    /// not: structural problems across lines are reported by validation
    /// and fail evaluation when reached.
    pub fn parse(v: &serde_json::Value) -> Result<PemdasGraph, EvalError> {
        let raw: RawGraph = serde_json::from_value(v.clone())
            .map_err(|e| EvalError::malformed(format!("pemdas graph: {}", e)))?;

        let mut lines = BTreeMap::new();
        for (line_id, raw_nodes) in raw.lines {
            let nodes = raw_nodes
                .into_iter()
                .enumerate()
                .map(|(i, n)| convert_node(&line_id, i, n))
                .collect::<Result<Vec<_>, _>>()?;
            lines.insert(line_id, nodes);
        }
        Ok(PemdasGraph {
            entry: raw.entry,
            lines,
        })
    }

    /// Jumps whose target line does not exist, as `(line, target)`.
    pub fn missing_targets(&self) -> Vec<(String, String)> {
        let mut missing = Vec::new();
        if !self.lines.contains_key(&self.entry) {
            missing.push(("<entry>".to_string(), self.entry.clone()));
        }
        for (line_id, nodes) in &self.lines {
            for target in nodes.iter().filter_map(|n| n.target_line_id.as_ref()) {
                if !self.lines.contains_key(target) {
                    missing.push((line_id.clone(), target.clone()));
                }
            }
        }
        missing
    }

    /// The first jump cycle reachable from any line, as a path of line
    /// ids ending where it started.
    pub fn jump_cycle(&self) -> Option<Vec<String>> {
        let mut done = BTreeSet::new();
        for start in self.lines.keys() {
            let mut stack = Vec::new();
            if let Some(path) = self.find_cycle(start, &mut stack, &mut done) {
                return Some(path);
            }
        }
        None
    }

    fn find_cycle<'g>(
        &'g self,
        line: &'g str,
        stack: &mut Vec<&'g str>,
        done: &mut BTreeSet<&'g str>,
    ) -> Option<Vec<String>> {
        if let Some(pos) = stack.iter().position(|l| *l == line) {
            let mut path: Vec<String> = stack[pos..].iter().map(|l| l.to_string()).collect();
            path.push(line.to_string());
            return Some(path);
        }
        if done.contains(line) {
            return None;
        }
        stack.push(line);
        if let Some(nodes) = self.lines.get(line) {
            for target in nodes.iter().filter_map(|n| n.target_line_id.as_deref()) {
                if let Some(path) = self.find_cycle(target, stack, done) {
                    return Some(path);
                }
            }
        }
        stack.pop();
        done.insert(line);
        None
    }

    /// Evaluate from the entry line.
    pub fn evaluate(&self, ctx: &mut RuntimeContext<'_>) -> Result<EvalValue, EvalError> {
        let mut stack = Vec::new();
        self.eval_line(&self.entry, ctx, &mut stack)
    }

    fn eval_line(
        &self,
        line_id: &str,
        ctx: &mut RuntimeContext<'_>,
        stack: &mut Vec<String>,
    ) -> Result<EvalValue, EvalError> {
        if stack.iter().any(|l| l == line_id) {
            let mut path = stack.clone();
            path.push(line_id.to_string());
            return Err(EvalError::ExpressionCycle { path });
        }
        let nodes = self.lines.get(line_id).ok_or_else(|| {
            EvalError::malformed(format!("pemdas line '{}' does not exist", line_id))
        })?;

        stack.push(line_id.to_string());
        let mut acc: Option<EvalValue> = None;
        for node in nodes {
            let value = match &node.target_line_id {
                Some(target) => self.eval_line(target, ctx, stack)?,
                None => contribution(node, ctx)?,
            };
            acc = Some(EvalValue::accumulate(acc, node.operand, &value, node.bucket)?);
        }
        stack.pop();

        Ok(acc.unwrap_or_else(|| EvalValue::scalar(Decimal::ZERO)))
    }
}

fn contribution(node: &PemdasNode, ctx: &mut RuntimeContext<'_>) -> Result<EvalValue, EvalError> {
    match node.kind {
        PemdasKind::Constant => Ok(EvalValue::scalar(node.value.unwrap_or_default())),
        PemdasKind::Variable => {
            let key = node.var_key.as_deref().unwrap_or_default();
            Ok(EvalValue::scalar(ctx.variable(key)?))
        }
        PemdasKind::ContributorNode => {
            let expr_id = node.expression_id.unwrap_or_default();
            ctx.eval_expression_id(expr_id)
        }
        PemdasKind::ContributorBucket => {
            let amount = match (&node.value, &node.var_key) {
                (Some(v), _) => *v,
                (None, Some(key)) => ctx.variable(key)?,
                (None, None) => Decimal::ZERO,
            };
            Ok(EvalValue::cost(CostBreakdown::in_bucket(node.bucket, amount)))
        }
    }
}

fn convert_node(line_id: &str, position: usize, raw: RawNode) -> Result<PemdasNode, EvalError> {
    let ctx = format!("pemdas line '{}' node {}", line_id, position);
    let kind = PemdasKind::parse(&raw.kind)
        .ok_or_else(|| EvalError::malformed(format!("{}: unknown kind '{}'", ctx, raw.kind)))?;
    let operand = match raw.operand.as_deref() {
        None => ArithOp::Add,
        Some(s) => ArithOp::parse(s)
            .ok_or_else(|| EvalError::malformed(format!("{}: unknown operand '{}'", ctx, s)))?,
    };
    let value = match &raw.value {
        None | Some(serde_json::Value::Null) => None,
        Some(v) => Some(numeric::decimal_from_json(v).ok_or_else(|| {
            EvalError::malformed(format!("{}: value {} is not a number", ctx, v))
        })?),
    };
    let bucket = Bucket::parse_optional(raw.bucket.as_deref(), &ctx)?;

    if raw.target_line_id.is_none() {
        let required = match kind {
            PemdasKind::Constant if value.is_none() => Some("value"),
            PemdasKind::Variable if raw.var_key.is_none() => Some("var_key"),
            PemdasKind::ContributorNode if raw.expression_id.is_none() => Some("expression_id"),
            PemdasKind::ContributorBucket if value.is_none() && raw.var_key.is_none() => {
                Some("value or var_key")
            }
            _ => None,
        };
        if let Some(field) = required {
            return Err(EvalError::malformed(format!("{}: requires {}", ctx, field)));
        }
    }

    Ok(PemdasNode {
        kind,
        operand,
        value,
        var_key: raw.var_key,
        expression_id: raw.expression_id,
        bucket,
        target_line_id: raw.target_line_id,
    })
}
