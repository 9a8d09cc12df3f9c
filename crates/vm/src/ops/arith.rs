//! Arithmetic on Word, Long and Float operands, string concatenation and
//! the percentage operators.

use opo_common::{Value, ValueType};

use super::{coerce, family_type, finite, short_string};
use crate::error::RuntimeError;
use crate::execute::Context;

/// Integer operation: `None` means the result does not fit.
type IntOp = fn(i32, i32) -> Result<Option<i32>, RuntimeError>;
type FloatOp = fn(f64, f64) -> Result<f64, RuntimeError>;

fn binary(ctx: &mut Context<'_>, int: IntOp, float: FloatOp) -> Result<(), RuntimeError> {
    let ty = family_type(ctx);
    let (a, b) = ctx.stack.pop2()?;
    let result = apply(ty, a, b, int, float)?;
    ctx.stack.push(result);
    Ok(())
}

fn apply(ty: ValueType, a: Value, b: Value, int: IntOp, float: FloatOp) -> Result<Value, RuntimeError> {
    match ty {
        ValueType::Word => {
            let (x, y) = (word(a)?, word(b)?);
            let wide = int(x.into(), y.into())?.ok_or(RuntimeError::Overflow)?;
            i16::try_from(wide).map(Value::Word).map_err(|_| RuntimeError::Overflow)
        }
        ValueType::Long => {
            let (x, y) = (long(a)?, long(b)?);
            int(x, y)?.map(Value::Long).ok_or(RuntimeError::Overflow)
        }
        _ => {
            let (x, y) = (float_of(a)?, float_of(b)?);
            Ok(Value::Float(finite(float(x, y)?)?))
        }
    }
}

fn word(v: Value) -> Result<i16, RuntimeError> {
    match coerce(v, ValueType::Word)? {
        Value::Word(w) => Ok(w),
        _ => Err(RuntimeError::Overflow),
    }
}

fn long(v: Value) -> Result<i32, RuntimeError> {
    match coerce(v, ValueType::Long)? {
        Value::Long(l) => Ok(l),
        _ => Err(RuntimeError::Overflow),
    }
}

fn float_of(v: Value) -> Result<f64, RuntimeError> {
    let found = v.value_type();
    v.as_f64().ok_or(RuntimeError::TypeMismatch {
        expected: ValueType::Float,
        found,
    })
}

/// `0x48`-`0x4B`. The String member concatenates.
pub(crate) fn add(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    if family_type(ctx) == ValueType::Str {
        let b = ctx.stack.pop_string()?;
        let mut a = ctx.stack.pop_string()?;
        a.push_str(&b);
        ctx.stack.push(short_string(a)?);
        return Ok(());
    }
    binary(ctx, |x, y| Ok(x.checked_add(y)), |x, y| Ok(x + y))
}

pub(crate) fn subtract(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    binary(ctx, |x, y| Ok(x.checked_sub(y)), |x, y| Ok(x - y))
}

pub(crate) fn multiply(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    binary(ctx, |x, y| Ok(x.checked_mul(y)), |x, y| Ok(x * y))
}

/// Integer division truncates towards zero.
pub(crate) fn divide(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    binary(
        ctx,
        |x, y| {
            if y == 0 {
                return Err(RuntimeError::DivideByZero);
            }
            Ok(x.checked_div(y))
        },
        |x, y| {
            if y == 0.0 {
                return Err(RuntimeError::DivideByZero);
            }
            Ok(x / y)
        },
    )
}

pub(crate) fn power(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    binary(ctx, int_power, |x, y| {
        if x == 0.0 && y < 0.0 {
            return Err(RuntimeError::DivideByZero);
        }
        Ok(x.powf(y))
    })
}

fn int_power(base: i32, exponent: i32) -> Result<Option<i32>, RuntimeError> {
    if exponent >= 0 {
        return Ok(u32::try_from(exponent).ok().and_then(|e| base.checked_pow(e)));
    }
    // A negative exponent leaves only the integer part of 1 / base^n.
    match base {
        0 => Err(RuntimeError::DivideByZero),
        1 => Ok(Some(1)),
        -1 => Ok(Some(if exponent % 2 == 0 { 1 } else { -1 })),
        _ => Ok(Some(0)),
    }
}

pub(crate) fn negate(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let value = ctx.stack.pop()?;
    let result = match family_type(ctx) {
        ValueType::Word => word(value)?.checked_neg().map(Value::Word),
        ValueType::Long => long(value)?.checked_neg().map(Value::Long),
        _ => Some(Value::Float(-float_of(value)?)),
    };
    ctx.stack.push(result.ok_or(RuntimeError::Overflow)?);
    Ok(())
}

// ---- Percentages ----
//
// `a op b%` with `b` on top of the stack. Operands are floats.

fn percent(ctx: &mut Context<'_>, op: FloatOp) -> Result<(), RuntimeError> {
    let b = ctx.stack.pop_float()?;
    let a = ctx.stack.pop_float()?;
    ctx.stack.push(Value::Float(finite(op(a, b)?)?));
    Ok(())
}

fn nonzero(divisor: f64) -> Result<f64, RuntimeError> {
    if divisor == 0.0 {
        Err(RuntimeError::DivideByZero)
    } else {
        Ok(divisor)
    }
}

/// `a < b%`: the amount `a` would have been increased by.
pub(crate) fn less_percent(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    percent(ctx, |a, b| Ok(a / nonzero(100.0 + b)? * b))
}

/// `a > b%`: the value before an increase of `b` percent gave `a`.
pub(crate) fn greater_percent(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    percent(ctx, |a, b| Ok(a / nonzero(100.0 + b)? * 100.0))
}

pub(crate) fn plus_percent(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    percent(ctx, |a, b| Ok(a / 100.0 * (100.0 + b)))
}

pub(crate) fn minus_percent(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    percent(ctx, |a, b| Ok(a / 100.0 * (100.0 - b)))
}

pub(crate) fn multiply_percent(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    percent(ctx, |a, b| Ok(a / 100.0 * b))
}

/// `a / b%`: what `a` is `b` percent of.
pub(crate) fn divide_percent(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    percent(ctx, |a, b| Ok(a / nonzero(b)? * 100.0))
}

// ---- Unsigned address arithmetic ----

fn unsigned(ctx: &mut Context<'_>, op: fn(u16, u16) -> u16) -> Result<(), RuntimeError> {
    let b = ctx.stack.pop_int()?;
    let a = ctx.stack.pop_int()?;
    let result = op(a as u16, b as u16);
    ctx.stack.push(Value::Word(result as i16));
    Ok(())
}

/// `UADD(a, b)`: 16-bit addition that wraps instead of overflowing.
pub(crate) fn unsigned_add(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    unsigned(ctx, u16::wrapping_add)
}

pub(crate) fn unsigned_subtract(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    unsigned(ctx, u16::wrapping_sub)
}
