//! Type coercion applied by `add` and `push`.
//!
//! A differently-typed existing value is silently replaced: `add` treats a
//! non-number as 0 and `push` treats a non-array as empty.

use serde_json::{Number, Value};

use crate::error::StoreError;

/// Numeric view of an existing value; anything that is not a number is 0.
pub fn coerce_numeric(value: Option<&Value>) -> f64 {
    value.and_then(Value::as_f64).unwrap_or(0.0)
}

/// Sequence view of an existing value; anything that is not an array is empty.
pub fn coerce_sequence(value: Option<Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

// Largest magnitude at which every integer is exactly representable in f64.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

/// JSON number for `n`. Integral values are stored as integers so `3.0`
/// serializes as `3`; NaN and infinities are rejected.
pub fn number_value(n: f64) -> Result<Value, StoreError> {
    if !n.is_finite() {
        return Err(StoreError::NonFiniteNumber);
    }
    if n.fract() == 0.0 && n.abs() <= MAX_EXACT_INT {
        return Ok(Value::from(n as i64));
    }
    Number::from_f64(n)
        .map(Value::Number)
        .ok_or(StoreError::NonFiniteNumber)
}
