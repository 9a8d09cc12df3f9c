//! Comparisons and the logical operators.

use std::cmp::Ordering;

use opo_common::{Value, ValueType};

use super::family_type;
use crate::error::RuntimeError;
use crate::execute::Context;

const TRUE: Value = Value::Word(-1);
const FALSE: Value = Value::Word(0);

fn flag(b: bool) -> Value {
    if b {
        TRUE
    } else {
        FALSE
    }
}

/// Orders two operands: numbers numerically, strings bytewise.
fn compare(a: &Value, b: &Value) -> Result<Ordering, RuntimeError> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(x.as_bytes().cmp(y.as_bytes())),
        (Value::Str(_), other) | (other, Value::Str(_)) => Err(RuntimeError::TypeMismatch {
            expected: ValueType::Str,
            found: other.value_type(),
        }),
        _ => match (a.as_i32(), b.as_i32()) {
            (Some(x), Some(y)) => Ok(x.cmp(&y)),
            _ => {
                let (x, y) = (a.as_f64(), b.as_f64());
                x.zip(y)
                    .and_then(|(x, y)| x.partial_cmp(&y))
                    .ok_or(RuntimeError::InvalidArgument)
            }
        },
    }
}

fn comparison(
    ctx: &mut Context<'_>,
    test: fn(Ordering) -> bool,
) -> Result<(), RuntimeError> {
    let (a, b) = ctx.stack.pop2()?;
    let ordering = compare(&a, &b)?;
    ctx.stack.push(flag(test(ordering)));
    Ok(())
}

pub(crate) fn less(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    comparison(ctx, Ordering::is_lt)
}

pub(crate) fn less_equal(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    comparison(ctx, Ordering::is_le)
}

pub(crate) fn greater(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    comparison(ctx, Ordering::is_gt)
}

pub(crate) fn greater_equal(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    comparison(ctx, Ordering::is_ge)
}

pub(crate) fn equal(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    comparison(ctx, Ordering::is_eq)
}

pub(crate) fn not_equal(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    comparison(ctx, Ordering::is_ne)
}

/// Word and Long operands combine bitwise and keep their width; Float
/// operands combine as truth values into a Word flag.
fn logical(
    ctx: &mut Context<'_>,
    bitwise: fn(i32, i32) -> i32,
    truth: fn(bool, bool) -> bool,
) -> Result<(), RuntimeError> {
    let ty = family_type(ctx);
    let (a, b) = ctx.stack.pop2()?;
    let result = match ty {
        ValueType::Word | ValueType::Long => {
            let x = integer(&a, ty)?;
            let y = integer(&b, ty)?;
            narrow(bitwise(x, y), ty)
        }
        _ => flag(truth(a.is_truthy(), b.is_truthy())),
    };
    ctx.stack.push(result);
    Ok(())
}

fn integer(value: &Value, expected: ValueType) -> Result<i32, RuntimeError> {
    value.as_i32().ok_or(RuntimeError::TypeMismatch {
        expected,
        found: value.value_type(),
    })
}

/// Bitwise results of Word operands always fit a Word.
fn narrow(v: i32, ty: ValueType) -> Value {
    match ty {
        ValueType::Word => Value::Word(v as i16),
        _ => Value::Long(v),
    }
}

pub(crate) fn and(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    logical(ctx, |x, y| x & y, |x, y| x && y)
}

pub(crate) fn or(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    logical(ctx, |x, y| x | y, |x, y| x || y)
}

pub(crate) fn not(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let ty = family_type(ctx);
    let value = ctx.stack.pop()?;
    let result = match ty {
        ValueType::Word | ValueType::Long => narrow(!integer(&value, ty)?, ty),
        _ => flag(!value.is_truthy()),
    };
    ctx.stack.push(result);
    Ok(())
}
