//! Opcode handlers, grouped by what they operate on.

pub(crate) mod arith;
pub(crate) mod control;
pub(crate) mod database;
pub(crate) mod datetime;
pub(crate) mod files;
pub(crate) mod io;
pub(crate) mod logic;
pub(crate) mod maths;
pub(crate) mod memory;
pub(crate) mod strings;
pub(crate) mod vars;

use opo_common::{Value, ValueType};

use crate::error::RuntimeError;
use crate::execute::Context;

/// Operand type of a type-family opcode: families start on a multiple of
/// four, in the order Word, Long, Float, String.
pub(crate) fn family_type(ctx: &Context<'_>) -> ValueType {
    ValueType::from_family_offset(ctx.activation.opcode & 0x03)
}

/// Rejects NaN and infinite float results.
pub(crate) fn finite(x: f64) -> Result<f64, RuntimeError> {
    if x.is_nan() {
        Err(RuntimeError::InvalidArgument)
    } else if x.is_infinite() {
        Err(RuntimeError::Overflow)
    } else {
        Ok(x)
    }
}

/// Converts a value to `ty`, as stores and conversions require. Floats
/// convert to integers by truncation.
pub(crate) fn coerce(value: Value, ty: ValueType) -> Result<Value, RuntimeError> {
    let found = value.value_type();
    if found == ty {
        return Ok(value);
    }
    let mismatch = RuntimeError::TypeMismatch { expected: ty, found };
    match ty {
        ValueType::Word => {
            let wide = integer_of(&value).ok_or(mismatch)?;
            i16::try_from(wide).map(Value::Word).map_err(|_| RuntimeError::Overflow)
        }
        ValueType::Long => {
            let wide = integer_of(&value).ok_or(mismatch)?;
            i32::try_from(wide).map(Value::Long).map_err(|_| RuntimeError::Overflow)
        }
        ValueType::Float => value.as_f64().map(Value::Float).ok_or(mismatch),
        ValueType::Addr => value.as_address().map(Value::Addr).ok_or(mismatch),
        ValueType::Str => Err(mismatch),
    }
}

fn integer_of(value: &Value) -> Option<i64> {
    match value {
        Value::Float(f) if f.is_finite() => Some(f.trunc() as i64),
        Value::Float(_) | Value::Str(_) => None,
        other => other.as_i32().map(i64::from),
    }
}

/// Checks a string fits behind a length byte.
pub(crate) fn short_string(s: String) -> Result<Value, RuntimeError> {
    if s.len() > 255 {
        return Err(RuntimeError::StringTooLong { len: s.len() });
    }
    Ok(Value::Str(s))
}
