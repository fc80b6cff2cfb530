//! Decimal helpers shared by fact coercion, expression evaluation and
//! pricing.
//!
//! All arithmetic uses `rust_decimal::Decimal`. Money leaving the engine
//! is rounded with `RoundingStrategy::MidpointNearestEven`. No `f64`
//! anywhere in the evaluation path.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::EvalError;

/// Decimal places kept on emitted line-item amounts.
pub const MONEY_SCALE: u32 = 2;

/// Parse a trimmed decimal or scientific-notation string.
///
/// Returns `None` for anything `Decimal` cannot represent (`NaN`,
/// `inf`, values out of range).
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

/// Read a decimal out of a JSON number or numeric string.
pub fn decimal_from_json(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::Number(n) => parse_decimal(&n.to_string()),
        serde_json::Value::String(s) => parse_decimal(s),
        _ => None,
    }
}

/// Round a money amount to [`MONEY_SCALE`] places, banker's rounding.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointNearestEven)
}

pub fn checked_add(left: Decimal, right: Decimal) -> Result<Decimal, EvalError> {
    left.checked_add(right).ok_or_else(|| EvalError::Overflow {
        message: format!("{} + {} overflows", left, right),
    })
}

pub fn checked_sub(left: Decimal, right: Decimal) -> Result<Decimal, EvalError> {
    left.checked_sub(right).ok_or_else(|| EvalError::Overflow {
        message: format!("{} - {} overflows", left, right),
    })
}

pub fn checked_mul(left: Decimal, right: Decimal) -> Result<Decimal, EvalError> {
    left.checked_mul(right).ok_or_else(|| EvalError::Overflow {
        message: format!("{} * {} overflows", left, right),
    })
}

/// Divide, substituting a divisor of 1 when `right` is zero.
///
/// Division by zero degrades to a no-op rather than an error. Authored
/// graphs rely on this when a rate variable is not yet known.
pub fn lenient_div(left: Decimal, right: Decimal) -> Result<Decimal, EvalError> {
    let divisor = if right.is_zero() { Decimal::ONE } else { right };
    left.checked_div(divisor).ok_or_else(|| EvalError::Overflow {
        message: format!("{} / {} overflows", left, divisor),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_plain_and_scientific() {
        assert_eq!(parse_decimal("1500"), Some(Decimal::from(1500)));
        assert_eq!(parse_decimal(" 12.50 "), Some(Decimal::new(1250, 2)));
        assert_eq!(parse_decimal("1e3"), Some(Decimal::from(1000)));
        assert_eq!(parse_decimal("2.5E-1"), Some(Decimal::new(25, 2)));
    }

    #[test]
    fn rejects_non_finite_and_garbage() {
        assert_eq!(parse_decimal("NaN"), None);
        assert_eq!(parse_decimal("inf"), None);
        assert_eq!(parse_decimal("twelve"), None);
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("   "), None);
    }

    #[test]
    fn json_numbers_and_strings() {
        assert_eq!(decimal_from_json(&json!(42)), Some(Decimal::from(42)));
        assert_eq!(decimal_from_json(&json!(-3.25)), Some(Decimal::new(-325, 2)));
        assert_eq!(decimal_from_json(&json!("7")), Some(Decimal::from(7)));
        assert_eq!(decimal_from_json(&json!(true)), None);
        assert_eq!(decimal_from_json(&json!(null)), None);
    }

    #[test]
    fn money_rounding_is_bankers() {
        assert_eq!(round_money(Decimal::new(1005, 3)), Decimal::new(100, 2));
        assert_eq!(round_money(Decimal::new(1015, 3)), Decimal::new(102, 2));
        assert_eq!(round_money(Decimal::new(12345, 3)), Decimal::new(1234, 2));
    }

    #[test]
    fn divide_by_zero_is_identity() {
        let a = Decimal::from(100);
        assert_eq!(lenient_div(a, Decimal::ZERO).unwrap(), a);
        assert_eq!(lenient_div(a, Decimal::from(4)).unwrap(), Decimal::from(25));
    }

    #[test]
    fn overflow_is_reported() {
        let err = checked_mul(Decimal::MAX, Decimal::from(2)).unwrap_err();
        assert!(matches!(err, EvalError::Overflow { .. }));
        let err = checked_add(Decimal::MAX, Decimal::ONE).unwrap_err();
        assert!(matches!(err, EvalError::Overflow { .. }));
    }
}
