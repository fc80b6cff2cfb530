//! Cost breakdown arithmetic.
//!
//! A [`CostBreakdown`] splits a money amount across labor, materials and
//! misc buckets with a redundant `total`. After every operation `total`
//! must equal the sum of the three buckets; drift beyond
//! [`COST_TOLERANCE`] is an error, drift within it is normalized away.
//!
//! Operator semantics for `a op b`:
//!
//! - `+` / `-`: component-wise over all four fields.
//! - `*`: every field of `a` scaled by `b.total`.
//! - `/`: every field of `a` divided by `b.total`, with a zero divisor
//!   replaced by 1.

use std::fmt;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::EvalError;
use crate::numeric;

/// Maximum allowed `|total - (labor + materials + misc)|` after an
/// operation: 1e-9.
pub const COST_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 9);

// ──────────────────────────────────────────────
// Operators and buckets
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    pub fn parse(raw: &str) -> Option<ArithOp> {
        match raw {
            "+" | "add" => Some(ArithOp::Add),
            "-" | "sub" | "subtract" => Some(ArithOp::Sub),
            "*" | "mul" | "multiply" => Some(ArithOp::Mul),
            "/" | "div" | "divide" => Some(ArithOp::Div),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        }
    }

    /// Seed for an accumulator whose first step is this operator.
    pub fn identity(self) -> Decimal {
        match self {
            ArithOp::Add | ArithOp::Sub => Decimal::ZERO,
            ArithOp::Mul | ArithOp::Div => Decimal::ONE,
        }
    }

    /// Plain decimal arithmetic, with the same zero-divisor substitution
    /// as cost division.
    pub fn apply(self, left: Decimal, right: Decimal) -> Result<Decimal, EvalError> {
        match self {
            ArithOp::Add => numeric::checked_add(left, right),
            ArithOp::Sub => numeric::checked_sub(left, right),
            ArithOp::Mul => numeric::checked_mul(left, right),
            ArithOp::Div => numeric::lenient_div(left, right),
        }
    }
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// The bucket a scalar lands in when it is lifted into a cost.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Labor,
    Materials,
    #[default]
    Misc,
}

impl Bucket {
    pub fn parse(raw: &str) -> Option<Bucket> {
        match raw.to_ascii_lowercase().as_str() {
            "labor" | "labour" => Some(Bucket::Labor),
            "materials" | "material" => Some(Bucket::Materials),
            "misc" | "other" => Some(Bucket::Misc),
            _ => None,
        }
    }

    /// Parse an optional stored bucket, defaulting to `Misc`.
    pub(crate) fn parse_optional(raw: Option<&str>, context: &str) -> Result<Bucket, EvalError> {
        match raw {
            None => Ok(Bucket::default()),
            Some(s) => Bucket::parse(s)
                .ok_or_else(|| EvalError::malformed(format!("{}: unknown bucket '{}'", context, s))),
        }
    }
}

// ──────────────────────────────────────────────
// CostBreakdown
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CostBreakdown {
    pub labor: Decimal,
    pub materials: Decimal,
    pub misc: Decimal,
    pub total: Decimal,
}

impl CostBreakdown {
    pub const ZERO: CostBreakdown = CostBreakdown {
        labor: Decimal::ZERO,
        materials: Decimal::ZERO,
        misc: Decimal::ZERO,
        total: Decimal::ZERO,
    };

    /// Build a breakdown whose total is the sum of the buckets.
    pub fn new(labor: Decimal, materials: Decimal, misc: Decimal) -> Result<Self, EvalError> {
        let total = numeric::checked_add(numeric::checked_add(labor, materials)?, misc)?;
        Ok(CostBreakdown {
            labor,
            materials,
            misc,
            total,
        })
    }

    /// A single amount placed in one bucket.
    pub fn in_bucket(bucket: Bucket, amount: Decimal) -> Self {
        let mut cost = CostBreakdown {
            total: amount,
            ..CostBreakdown::ZERO
        };
        match bucket {
            Bucket::Labor => cost.labor = amount,
            Bucket::Materials => cost.materials = amount,
            Bucket::Misc => cost.misc = amount,
        }
        cost
    }

    pub fn component_sum(&self) -> Result<Decimal, EvalError> {
        numeric::checked_add(numeric::checked_add(self.labor, self.materials)?, self.misc)
    }

    /// Combine two breakdowns and check the additivity invariant on the
    /// result.
    pub fn combine(&self, op: ArithOp, rhs: &CostBreakdown) -> Result<CostBreakdown, EvalError> {
        let result = match op {
            ArithOp::Add | ArithOp::Sub => CostBreakdown {
                labor: op.apply(self.labor, rhs.labor)?,
                materials: op.apply(self.materials, rhs.materials)?,
                misc: op.apply(self.misc, rhs.misc)?,
                total: op.apply(self.total, rhs.total)?,
            },
            ArithOp::Mul | ArithOp::Div => self.scaled(op, rhs.total)?,
        };
        result.normalized(op)
    }

    fn scaled(&self, op: ArithOp, factor: Decimal) -> Result<CostBreakdown, EvalError> {
        Ok(CostBreakdown {
            labor: op.apply(self.labor, factor)?,
            materials: op.apply(self.materials, factor)?,
            misc: op.apply(self.misc, factor)?,
            total: op.apply(self.total, factor)?,
        })
    }

    fn normalized(self, op: ArithOp) -> Result<CostBreakdown, EvalError> {
        let sum = self.component_sum()?;
        let drift = numeric::checked_sub(self.total, sum)?.abs();
        if drift > COST_TOLERANCE {
            return Err(EvalError::CostInvariant {
                message: format!(
                    "after '{}': total {} != labor {} + materials {} + misc {}",
                    op, self.total, self.labor, self.materials, self.misc
                ),
            });
        }
        Ok(CostBreakdown { total: sum, ..self })
    }
}

// ──────────────────────────────────────────────
// EvalValue
// ──────────────────────────────────────────────

/// Result of evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvalValue {
    Scalar { value: Decimal },
    Cost { breakdown: CostBreakdown },
    Bool { value: bool },
}

impl EvalValue {
    pub fn scalar(value: Decimal) -> Self {
        EvalValue::Scalar { value }
    }

    pub fn cost(breakdown: CostBreakdown) -> Self {
        EvalValue::Cost { breakdown }
    }

    pub fn boolean(value: bool) -> Self {
        EvalValue::Bool { value }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            EvalValue::Scalar { .. } => "scalar",
            EvalValue::Cost { .. } => "cost",
            EvalValue::Bool { .. } => "boolean",
        }
    }

    /// The identity element for `op` in the same kind as `like`.
    pub fn identity_for(op: ArithOp, like: &EvalValue, bucket: Bucket) -> EvalValue {
        match like {
            EvalValue::Cost { .. } => EvalValue::cost(CostBreakdown::in_bucket(bucket, op.identity())),
            _ => EvalValue::scalar(op.identity()),
        }
    }

    /// Apply `self op rhs`. A scalar meeting a cost is lifted into
    /// `bucket` first.
    pub fn combine(&self, op: ArithOp, rhs: &EvalValue, bucket: Bucket) -> Result<EvalValue, EvalError> {
        match (self, rhs) {
            (EvalValue::Scalar { value: a }, EvalValue::Scalar { value: b }) => {
                Ok(EvalValue::scalar(op.apply(*a, *b)?))
            }
            (EvalValue::Cost { breakdown: a }, EvalValue::Cost { breakdown: b }) => {
                Ok(EvalValue::cost(a.combine(op, b)?))
            }
            (EvalValue::Scalar { value: a }, EvalValue::Cost { breakdown: b }) => Ok(
                EvalValue::cost(CostBreakdown::in_bucket(bucket, *a).combine(op, b)?),
            ),
            (EvalValue::Cost { breakdown: a }, EvalValue::Scalar { value: b }) => Ok(
                EvalValue::cost(a.combine(op, &CostBreakdown::in_bucket(bucket, *b))?),
            ),
            (left, right) => Err(EvalError::type_mismatch(format!(
                "cannot apply '{}' to {} and {}",
                op,
                left.type_name(),
                right.type_name()
            ))),
        }
    }

    /// Fold `rhs` into an optional accumulator, seeding an empty one with
    /// the identity of `op`.
    ///
    /// A cost arriving first under `*` or `/` becomes the accumulator
    /// as-is: a breakdown scales bucket by bucket, so there is no single
    /// bucketed identity to combine it with.
    pub fn accumulate(
        acc: Option<EvalValue>,
        op: ArithOp,
        rhs: &EvalValue,
        bucket: Bucket,
    ) -> Result<EvalValue, EvalError> {
        let seed = match acc {
            Some(acc) => acc,
            None if matches!(op, ArithOp::Mul | ArithOp::Div)
                && matches!(rhs, EvalValue::Cost { .. }) =>
            {
                return Ok(rhs.clone());
            }
            None => EvalValue::identity_for(op, rhs, bucket),
        };
        seed.combine(op, rhs, bucket)
    }

    pub fn as_scalar(&self) -> Result<Decimal, EvalError> {
        match self {
            EvalValue::Scalar { value } => Ok(*value),
            other => Err(EvalError::type_mismatch(format!(
                "expected a scalar, got {}",
                other.type_name()
            ))),
        }
    }

    /// Booleans, or scalars that are exactly 0 or 1.
    pub fn as_bool(&self) -> Result<bool, EvalError> {
        match self {
            EvalValue::Bool { value } => Ok(*value),
            EvalValue::Scalar { value } if value.is_zero() => Ok(false),
            EvalValue::Scalar { value } if *value == Decimal::ONE => Ok(true),
            other => Err(EvalError::type_mismatch(format!(
                "expected a boolean, got {} {}",
                other.type_name(),
                other
            ))),
        }
    }

    /// A money amount: a scalar as-is, a cost by its total.
    pub fn amount(&self) -> Result<Decimal, EvalError> {
        match self {
            EvalValue::Scalar { value } => Ok(*value),
            EvalValue::Cost { breakdown } => Ok(breakdown.total),
            EvalValue::Bool { .. } => Err(EvalError::type_mismatch(
                "expected a money amount, got boolean",
            )),
        }
    }
}

impl fmt::Display for EvalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalValue::Scalar { value } => write!(f, "{}", value.normalize()),
            EvalValue::Bool { value } => write!(f, "{}", value),
            EvalValue::Cost { breakdown } => write!(
                f,
                "{} (labor {}, materials {}, misc {})",
                breakdown.total.normalize(),
                breakdown.labor.normalize(),
                breakdown.materials.normalize(),
                breakdown.misc.normalize()
            ),
        }
    }
}
