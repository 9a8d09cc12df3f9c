//! Numeric functions, RND and the list statistics.

use ::std::f64::consts::PI;

use opo_common::{Value, ValueType};

use super::finite;
use crate::error::RuntimeError;
use crate::execute::Context;

fn unary(ctx: &mut Context<'_>, f: fn(f64) -> f64) -> Result<(), RuntimeError> {
    let x = ctx.stack.pop_float()?;
    ctx.stack.push(Value::Float(finite(f(x))?));
    Ok(())
}

pub(crate) fn abs(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    unary(ctx, f64::abs)
}

pub(crate) fn acos(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    unary(ctx, f64::acos)
}

pub(crate) fn asin(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    unary(ctx, f64::asin)
}

pub(crate) fn atan(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    unary(ctx, f64::atan)
}

pub(crate) fn cos(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    unary(ctx, f64::cos)
}

pub(crate) fn sin(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    unary(ctx, f64::sin)
}

pub(crate) fn tan(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    unary(ctx, f64::tan)
}

pub(crate) fn deg(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    unary(ctx, f64::to_degrees)
}

pub(crate) fn rad(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    unary(ctx, f64::to_radians)
}

pub(crate) fn exp(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    unary(ctx, f64::exp)
}

/// Natural logarithm; zero and negative arguments are invalid.
pub(crate) fn ln(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    unary(ctx, |x| if x > 0.0 { x.ln() } else { f64::NAN })
}

pub(crate) fn log(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    unary(ctx, |x| if x > 0.0 { x.log10() } else { f64::NAN })
}

pub(crate) fn sqr(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    unary(ctx, f64::sqrt)
}

/// `INTF(x)`: `x` truncated, still a Float.
pub(crate) fn intf(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    unary(ctx, f64::trunc)
}

/// `INT(x)`: `x` truncated to a Long.
pub(crate) fn int(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let x = ctx.stack.pop_float()?.trunc();
    if !(f64::from(i32::MIN)..=f64::from(i32::MAX)).contains(&x) {
        return Err(RuntimeError::Overflow);
    }
    ctx.stack.push(Value::Long(x as i32));
    Ok(())
}

/// `FLT(x&)`.
pub(crate) fn flt(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let x = ctx.stack.pop_int()?;
    ctx.stack.push(Value::Float(f64::from(x)));
    Ok(())
}

pub(crate) fn pi(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    ctx.stack.push(Value::Float(PI));
    Ok(())
}

/// `VAL(s$)`: leading and trailing blanks are ignored.
pub(crate) fn val(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let s = ctx.stack.pop_string()?;
    let x: f64 = s.trim().parse().map_err(|_| RuntimeError::InvalidArgument)?;
    ctx.stack.push(Value::Float(finite(x)?));
    Ok(())
}

pub(crate) fn rnd(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let x = ctx.env.rng.next_f64();
    ctx.stack.push(Value::Float(x));
    Ok(())
}

/// `0xB9`: `RANDOMIZE seed&`.
pub(crate) fn randomize(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let seed = ctx.stack.pop_int()?;
    ctx.env.rng.reseed(seed);
    Ok(())
}

// ---- List statistics ----

/// The operands of a list function. The inline byte is the number of
/// floats on the stack; zero means an array address and element count
/// are on the stack instead.
fn operands(ctx: &mut Context<'_>) -> Result<Vec<f64>, RuntimeError> {
    let na = ctx.activation.read_u8()?;
    if na == 0 {
        let n = ctx.stack.pop_int()?;
        let base = ctx.stack.pop_address()?;
        let n = usize::try_from(n).map_err(|_| RuntimeError::InvalidArgument)?;
        return (0..n)
            .map(|i| -> Result<f64, RuntimeError> {
                match ctx.heap.read(ValueType::Float, base + 8 * i)? {
                    Value::Float(x) => Ok(x),
                    _ => Err(RuntimeError::InvalidArgument),
                }
            })
            .collect();
    }
    let values = ctx.stack.pop_n(usize::from(na))?;
    values
        .iter()
        .map(|v| {
            v.as_f64().ok_or(RuntimeError::TypeMismatch {
                expected: ValueType::Float,
                found: v.value_type(),
            })
        })
        .collect()
}

fn statistic(ctx: &mut Context<'_>, f: fn(&[f64]) -> Result<f64, RuntimeError>) -> Result<(), RuntimeError> {
    let values = operands(ctx)?;
    let result = f(&values)?;
    ctx.stack.push(Value::Float(finite(result)?));
    Ok(())
}

fn nonempty(values: &[f64]) -> Result<&[f64], RuntimeError> {
    if values.is_empty() {
        Err(RuntimeError::InvalidArgument)
    } else {
        Ok(values)
    }
}

fn mean_of(values: &[f64]) -> Result<f64, RuntimeError> {
    let values = nonempty(values)?;
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample variance; needs at least two values.
fn variance_of(values: &[f64]) -> Result<f64, RuntimeError> {
    if values.len() < 2 {
        return Err(RuntimeError::InvalidArgument);
    }
    let mean = mean_of(values)?;
    let squares: f64 = values.iter().map(|x| (x - mean).powi(2)).sum();
    Ok(squares / (values.len() - 1) as f64)
}

pub(crate) fn max(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    statistic(ctx, |v| Ok(nonempty(v)?.iter().copied().fold(f64::MIN, f64::max)))
}

pub(crate) fn min(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    statistic(ctx, |v| Ok(nonempty(v)?.iter().copied().fold(f64::MAX, f64::min)))
}

pub(crate) fn mean(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    statistic(ctx, mean_of)
}

pub(crate) fn sum(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    statistic(ctx, |v| Ok(v.iter().sum()))
}

pub(crate) fn std(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    statistic(ctx, |v| Ok(variance_of(v)?.sqrt()))
}

pub(crate) fn var(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    statistic(ctx, variance_of)
}
