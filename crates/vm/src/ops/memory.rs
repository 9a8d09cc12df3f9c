//! Direct heap access: ADDR, PEEK, POKE and ALLOC.

use opo_common::{Value, ValueType};
use tracing::debug;

use super::{coerce, family_type};
use crate::error::RuntimeError;
use crate::execute::Context;

fn word_address(address: usize) -> Value {
    Value::Word(address as u16 as i16)
}

/// `ADDR(var)`: turn the address on the stack into a Word.
pub(crate) fn address_of(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let address = ctx.stack.pop_address()?;
    ctx.stack.push(word_address(address));
    Ok(())
}

/// `ADDR(var$)`: the address of a string's maximum-length byte.
pub(crate) fn address_of_string(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let address = ctx.stack.pop_address()?;
    let leading = address.checked_sub(1).ok_or(RuntimeError::AddressOutOfRange {
        address,
        size: ctx.heap.size(),
    })?;
    ctx.stack.push(word_address(leading));
    Ok(())
}

/// `0x98`-`0x9B`: `POKEW`, `POKEL`, `POKEF` and `POKE$`.
pub(crate) fn poke(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let ty = family_type(ctx);
    let value = coerce(ctx.stack.pop()?, ty)?;
    let address = ctx.stack.pop_address()?;
    ctx.heap.write(&value, address)
}

/// `0x9C`: `POKEB addr, byte`. Only the low byte is stored.
pub(crate) fn poke_byte(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let value = ctx.stack.pop_int()?;
    let address = ctx.stack.pop_address()?;
    ctx.heap.write_byte(address, value as u8)
}

pub(crate) fn peek_byte(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let address = ctx.stack.pop_address()?;
    let byte = ctx.heap.read_byte(address)?;
    ctx.stack.push(Value::Word(i16::from(byte)));
    Ok(())
}

fn peek(ctx: &mut Context<'_>, ty: ValueType) -> Result<(), RuntimeError> {
    let address = ctx.stack.pop_address()?;
    let value = ctx.heap.read(ty, address)?;
    ctx.stack.push(value);
    Ok(())
}

pub(crate) fn peek_word(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    peek(ctx, ValueType::Word)
}

pub(crate) fn peek_float(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    peek(ctx, ValueType::Float)
}

/// `PEEK$(addr)`: the string whose length byte is at `addr`.
pub(crate) fn peek_string(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    peek(ctx, ValueType::Str)
}

/// `ALLOC(size)`: a zeroed heap block, or 0 when the heap is exhausted.
pub(crate) fn alloc(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let size = ctx.stack.pop_int()?;
    let size = usize::try_from(size).map_err(|_| RuntimeError::InvalidArgument)?;
    let offset = match ctx.heap.allocate(size) {
        Ok(offset) => offset,
        Err(RuntimeError::OutOfMemory { requested }) => {
            debug!(requested, "ALLOC failed");
            0
        }
        Err(e) => return Err(e),
    };
    ctx.stack.push(word_address(offset));
    Ok(())
}
