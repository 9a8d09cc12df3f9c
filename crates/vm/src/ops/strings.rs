//! String functions. Positions are 1-based and count characters.

use opo_common::Value;

use super::short_string;
use crate::error::RuntimeError;
use crate::execute::Context;

fn push_string(ctx: &mut Context<'_>, s: String) -> Result<(), RuntimeError> {
    let value = short_string(s)?;
    ctx.stack.push(value);
    Ok(())
}

fn count(n: i32) -> Result<usize, RuntimeError> {
    usize::try_from(n).map_err(|_| RuntimeError::InvalidArgument)
}

fn word(n: usize) -> Value {
    Value::Word(i16::try_from(n).unwrap_or(i16::MAX))
}

/// `ASC(s$)`: code of the first character, 0 for an empty string.
pub(crate) fn asc(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let s = ctx.stack.pop_string()?;
    let code = s.chars().next().map_or(0, |c| c as u32);
    ctx.stack.push(Value::Word(i16::try_from(code).unwrap_or(i16::MAX)));
    Ok(())
}

pub(crate) fn len(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let s = ctx.stack.pop_string()?;
    ctx.stack.push(word(s.chars().count()));
    Ok(())
}

/// `LOC(haystack$, needle$)`: 1-based position of the first
/// case-insensitive match, or 0.
pub(crate) fn loc(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let needle = ctx.stack.pop_string()?.to_uppercase();
    let haystack = ctx.stack.pop_string()?.to_uppercase();
    let position = haystack
        .find(&needle)
        .map_or(0, |at| haystack[..at].chars().count() + 1);
    ctx.stack.push(word(position));
    Ok(())
}

pub(crate) fn chr(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let code = ctx.stack.pop_int()?;
    let c = u8::try_from(code)
        .map(char::from)
        .map_err(|_| RuntimeError::OutOfRange { value: code.into() })?;
    push_string(ctx, c.to_string())
}

pub(crate) fn left(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let n = count(ctx.stack.pop_int()?)?;
    let s = ctx.stack.pop_string()?;
    push_string(ctx, s.chars().take(n).collect())
}

pub(crate) fn right(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let n = count(ctx.stack.pop_int()?)?;
    let s = ctx.stack.pop_string()?;
    let skip = s.chars().count().saturating_sub(n);
    push_string(ctx, s.chars().skip(skip).collect())
}

/// `MID$(s$, start, len)`.
pub(crate) fn mid(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let n = count(ctx.stack.pop_int()?)?;
    let start = ctx.stack.pop_int()?;
    let s = ctx.stack.pop_string()?;
    if start < 1 {
        return Err(RuntimeError::OutOfRange { value: start.into() });
    }
    push_string(ctx, s.chars().skip(start as usize - 1).take(n).collect())
}

/// `REPT$(s$, n)`. A negative count gives an empty string.
pub(crate) fn rept(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let n = ctx.stack.pop_int()?;
    let s = ctx.stack.pop_string()?;
    let n = usize::try_from(n).unwrap_or(0);
    if s.len().saturating_mul(n) > 255 {
        return Err(RuntimeError::StringTooLong {
            len: s.len().saturating_mul(n),
        });
    }
    push_string(ctx, s.repeat(n))
}

pub(crate) fn upper(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let s = ctx.stack.pop_string()?;
    push_string(ctx, s.to_uppercase())
}

pub(crate) fn lower(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let s = ctx.stack.pop_string()?;
    push_string(ctx, s.to_lowercase())
}

/// `HEX$(x&)`: upper-case hexadecimal of the 32-bit pattern.
pub(crate) fn hex(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let v = ctx.stack.pop_int()?;
    push_string(ctx, format!("{:X}", v as u32))
}

// ---- Number formatting ----

/// Fits `s` into `width` characters. Too long gives a row of `*`; a
/// negative width right-justifies.
fn fit(s: String, width: i32) -> String {
    let w = width.unsigned_abs() as usize;
    let len = s.chars().count();
    if len > w {
        "*".repeat(w)
    } else if width < 0 {
        format!("{s:>w$}")
    } else {
        s
    }
}

fn integral(x: f64) -> String {
    format!("{:.0}", x.round())
}

fn general(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        integral(x)
    } else {
        x.to_string()
    }
}

/// `NUM$(x, width)`: `x` rounded to an integer.
pub(crate) fn num(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let width = ctx.stack.pop_int()?;
    let x = ctx.stack.pop_float()?;
    push_string(ctx, fit(integral(x), width))
}

/// `FIX$(x, places, width)`.
pub(crate) fn fix(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let width = ctx.stack.pop_int()?;
    let places = count(ctx.stack.pop_int()?)?;
    let x = ctx.stack.pop_float()?;
    push_string(ctx, fit(format!("{x:.places$}"), width))
}

/// `GEN$(x, width)`: integers without a point, others in shortest form.
pub(crate) fn gen(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let width = ctx.stack.pop_int()?;
    let x = ctx.stack.pop_float()?;
    push_string(ctx, fit(general(x), width))
}
