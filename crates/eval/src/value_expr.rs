//! Inline value expressions in pricing node configuration.
//!
//! `produces[].value` and `cost_range.min` / `cost_range.max` hold one of:
//!
//! ```text
//! 12.5 | "12.5"                             literal
//! {"var": key}                              variable
//! {"fact": key}                             numeric or boolean fact
//! {"op": "+", "left": e, "right": e}        arithmetic, optional "bucket"
//! {"if": condition, "then": e, "else": e}
//! {"tree": tree_id}                         decision tree result
//! {"expression": expr_id}                   stored expression node
//! {"pemdas": {"entry": .., "lines": ..}}    line-based expression
//! ```

use rust_decimal::Decimal;

use crate::condition::Condition;
use crate::context::{self, RuntimeContext};
use crate::cost::{ArithOp, Bucket, EvalValue};
use crate::error::EvalError;
use crate::numeric;
use crate::pemdas::PemdasGraph;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueExpr {
    Literal(Decimal),
    Var(String),
    Fact(String),
    Arith {
        op: ArithOp,
        left: Box<ValueExpr>,
        right: Box<ValueExpr>,
        bucket: Bucket,
    },
    If {
        condition: Condition,
        then: Box<ValueExpr>,
        otherwise: Box<ValueExpr>,
    },
    Tree(i64),
    Expression(i64),
    Pemdas(PemdasGraph),
}

impl ValueExpr {
    pub fn parse(v: &serde_json::Value) -> Result<ValueExpr, EvalError> {
        let unrecognized = || EvalError::malformed(format!("unrecognized value expression: {}", v));

        match v {
            serde_json::Value::Number(_) | serde_json::Value::String(_) => {
                return numeric::decimal_from_json(v)
                    .map(ValueExpr::Literal)
                    .ok_or_else(unrecognized)
            }
            serde_json::Value::Object(_) => {}
            _ => return Err(unrecognized()),
        }

        if let Some(key) = v.get("var") {
            return key
                .as_str()
                .map(|k| ValueExpr::Var(k.to_string()))
                .ok_or_else(unrecognized);
        }
        if let Some(key) = v.get("fact") {
            return key
                .as_str()
                .map(|k| ValueExpr::Fact(k.to_string()))
                .ok_or_else(unrecognized);
        }
        if let Some(op) = v.get("op") {
            let op = op.as_str().and_then(ArithOp::parse).ok_or_else(unrecognized)?;
            let left = v.get("left").ok_or_else(unrecognized)?;
            let right = v.get("right").ok_or_else(unrecognized)?;
            let bucket = Bucket::parse_optional(
                v.get("bucket").and_then(|b| b.as_str()),
                "value expression",
            )?;
            return Ok(ValueExpr::Arith {
                op,
                left: Box::new(ValueExpr::parse(left)?),
                right: Box::new(ValueExpr::parse(right)?),
                bucket,
            });
        }
        if let Some(condition) = v.get("if") {
            let then = v.get("then").ok_or_else(unrecognized)?;
            let otherwise = v.get("else").ok_or_else(unrecognized)?;
            return Ok(ValueExpr::If {
                condition: Condition::parse(condition)?,
                then: Box::new(ValueExpr::parse(then)?),
                otherwise: Box::new(ValueExpr::parse(otherwise)?),
            });
        }
        if let Some(id) = v.get("tree") {
            return id.as_i64().map(ValueExpr::Tree).ok_or_else(unrecognized);
        }
        if let Some(id) = v.get("expression") {
            return id.as_i64().map(ValueExpr::Expression).ok_or_else(unrecognized);
        }
        if let Some(graph) = v.get("pemdas") {
            return PemdasGraph::parse(graph).map(ValueExpr::Pemdas);
        }
        Err(unrecognized())
    }

    /// The literal value, when this expression is one.
    pub fn literal(&self) -> Option<Decimal> {
        match self {
            ValueExpr::Literal(d) => Some(*d),
            _ => None,
        }
    }

    /// Every line-based expression nested in this one.
    pub fn pemdas_graphs(&self) -> Vec<&PemdasGraph> {
        let mut out = Vec::new();
        self.collect_pemdas(&mut out);
        out
    }

    fn collect_pemdas<'e>(&'e self, out: &mut Vec<&'e PemdasGraph>) {
        match self {
            ValueExpr::Pemdas(graph) => out.push(graph),
            ValueExpr::Arith { left, right, .. } => {
                left.collect_pemdas(out);
                right.collect_pemdas(out);
            }
            ValueExpr::If {
                then, otherwise, ..
            } => {
                then.collect_pemdas(out);
                otherwise.collect_pemdas(out);
            }
            _ => {}
        }
    }

    pub fn evaluate(&self, ctx: &mut RuntimeContext<'_>) -> Result<EvalValue, EvalError> {
        match self {
            ValueExpr::Literal(d) => Ok(EvalValue::scalar(*d)),
            ValueExpr::Var(key) => Ok(EvalValue::scalar(ctx.variable(key)?)),
            ValueExpr::Fact(key) => context::fact_to_value(key, ctx.fact(key)?),
            ValueExpr::Arith {
                op,
                left,
                right,
                bucket,
            } => {
                let l = left.evaluate(ctx)?;
                let r = right.evaluate(ctx)?;
                l.combine(*op, &r, *bucket)
            }
            ValueExpr::If {
                condition,
                then,
                otherwise,
            } => {
                if ctx.condition(condition)? {
                    then.evaluate(ctx)
                } else {
                    otherwise.evaluate(ctx)
                }
            }
            ValueExpr::Tree(tree_id) => ctx.evaluate_tree(*tree_id),
            ValueExpr::Expression(expr_id) => ctx.eval_expression_id(*expr_id),
            ValueExpr::Pemdas(graph) => graph.evaluate(ctx),
        }
    }
}
