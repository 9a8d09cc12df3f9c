//! Variable access, literals, conversions and stores.

use opo_common::{Value, ValueType};

use super::{coerce, family_type};
use crate::error::RuntimeError;
use crate::execute::Context;
use crate::heap::FrameHeap;
use crate::resolve::Resolved;

// ---- Local variables ----

/// `0x00`-`0x03`: push the value of a variable in the current frame.
pub(crate) fn push_local(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let ty = family_type(ctx);
    let offset = ctx.activation.read_u16()? as usize;
    let value = ctx.heap.read(ty, ctx.activation.frame + offset)?;
    ctx.stack.push(value);
    Ok(())
}

/// `0x04`-`0x07`: push the address of a variable in the current frame.
pub(crate) fn push_local_address(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let offset = ctx.activation.read_u16()? as usize;
    ctx.stack.push(address(ctx.activation.frame + offset)?);
    Ok(())
}

/// `0x10`-`0x13`: push an element of an array in the current frame.
pub(crate) fn push_local_element(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let ty = family_type(ctx);
    let element = local_element(ctx, ty)?;
    let value = ctx.heap.read(ty, element)?;
    ctx.stack.push(value);
    Ok(())
}

/// `0x14`-`0x17`: push the address of an array element in the current frame.
pub(crate) fn push_local_element_address(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let ty = family_type(ctx);
    let element = local_element(ctx, ty)?;
    ctx.stack.push(address(element)?);
    Ok(())
}

fn local_element(ctx: &mut Context<'_>, ty: ValueType) -> Result<usize, RuntimeError> {
    let offset = ctx.activation.read_u16()? as usize;
    let index = ctx.stack.pop_int()?;
    let owner = ctx.current_index();
    element_address(ctx, owner, ctx.activation.frame + offset, ty, index)
}

// ---- External (EE) references ----

/// `0x08`-`0x0B`: push the value of a global, imported global or parameter.
pub(crate) fn push_ee(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let ty = family_type(ctx);
    let ee = ctx.activation.read_u16()?;
    let value = match ctx.resolve(ee, true)? {
        Resolved::Variable(reference) => ctx.heap.read(ty, reference.address)?,
        Resolved::Parameter(value) => value,
    };
    ctx.stack.push(value);
    Ok(())
}

/// `0x0C`-`0x0F`: push the address of a global or imported global.
pub(crate) fn push_ee_address(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let ee = ctx.activation.read_u16()?;
    let reference = ctx.resolve_variable(ee)?;
    ctx.stack.push(address(reference.address)?);
    Ok(())
}

/// `0x18`-`0x1B`: push an element of a global array.
pub(crate) fn push_ee_element(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let ty = family_type(ctx);
    let element = ee_element(ctx, ty)?;
    let value = ctx.heap.read(ty, element)?;
    ctx.stack.push(value);
    Ok(())
}

/// `0x1C`-`0x1F`: push the address of an element of a global array.
pub(crate) fn push_ee_element_address(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let ty = family_type(ctx);
    let element = ee_element(ctx, ty)?;
    ctx.stack.push(address(element)?);
    Ok(())
}

fn ee_element(ctx: &mut Context<'_>, ty: ValueType) -> Result<usize, RuntimeError> {
    let ee = ctx.activation.read_u16()?;
    let index = ctx.stack.pop_int()?;
    let reference = ctx.resolve_variable(ee)?;
    element_address(ctx, reference.owner, reference.address, ty, index)
}

/// Address of element `index` of the array at `base` in the frame of
/// activation `owner`. Bounds and string capacity come from the owner's
/// declarations when it has them.
fn element_address(
    ctx: &Context<'_>,
    owner: usize,
    base: usize,
    ty: ValueType,
    index: i32,
) -> Result<usize, RuntimeError> {
    let (procedure, frame) = ctx.frame_of(owner);
    let relative = base.checked_sub(frame);
    // Numeric data follows the count word; string data follows the count
    // word and the capacity byte.
    let count_gap = if ty == ValueType::Str { 3 } else { 2 };
    let declared_length = relative
        .and_then(|r| r.checked_sub(count_gap))
        .and_then(|o| procedure.array_declaration_at(o as u16))
        .map(|a| a.length);
    if let Some(length) = declared_length {
        if index > i32::from(length) {
            return Err(RuntimeError::ArrayIndexOutOfBounds { index });
        }
    }

    let capacity = if ty == ValueType::Str {
        let declared = relative
            .and_then(|r| r.checked_sub(1))
            .and_then(|o| procedure.string_declaration_at(o as u16))
            .map(|s| s.max_length);
        match declared {
            Some(max) => max,
            None => {
                let at = base.checked_sub(1).ok_or(RuntimeError::AddressOutOfRange {
                    address: base,
                    size: ctx.heap.size(),
                })?;
                ctx.heap.read_byte(at)?
            }
        }
    } else {
        0
    };

    FrameHeap::element_address(ty, base, index, capacity)
}

fn address(offset: usize) -> Result<Value, RuntimeError> {
    u16::try_from(offset)
        .map(Value::Addr)
        .map_err(|_| RuntimeError::AddressOutOfRange {
            address: offset,
            size: usize::from(u16::MAX) + 1,
        })
}

// ---- Database fields ----

/// `0x20`-`0x23`: push a field of the current record of logical file D.
pub(crate) fn push_field(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let ty = family_type(ctx);
    let handle = ctx.activation.read_u8()?;
    let field = ctx.stack.pop_string()?;
    let value = ctx
        .env
        .host
        .field_value(handle, &field)
        .ok_or(RuntimeError::FieldNotFound { field })?;
    ctx.stack.push(coerce(value, ty)?);
    Ok(())
}

// ---- Literals ----

/// `0x28`-`0x2B`: push an inline literal of the family's type.
pub(crate) fn push_literal(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let value = match family_type(ctx) {
        ValueType::Word => Value::Word(ctx.activation.read_i16()?),
        ValueType::Long => Value::Long(ctx.activation.read_i32()?),
        ValueType::Float => Value::Float(ctx.activation.read_f64()?),
        _ => Value::Str(ctx.activation.read_qstr()?),
    };
    ctx.stack.push(value);
    Ok(())
}

/// `0x4F`: push a sign-extended byte as a Word.
pub(crate) fn push_byte_as_word(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let byte = ctx.activation.read_i8()?;
    ctx.stack.push(Value::Word(i16::from(byte)));
    Ok(())
}

/// `0x5F`: push a sign-extended byte as a Long.
pub(crate) fn push_byte_as_long(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let byte = ctx.activation.read_i8()?;
    ctx.stack.push(Value::Long(i32::from(byte)));
    Ok(())
}

/// `0x63`: push a sign-extended Word as a Long.
pub(crate) fn push_word_as_long(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let word = ctx.activation.read_i16()?;
    ctx.stack.push(Value::Long(i32::from(word)));
    Ok(())
}

// ---- Conversions ----

pub(crate) fn convert_to_word(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    convert(ctx, ValueType::Word)
}

pub(crate) fn convert_to_long(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    convert(ctx, ValueType::Long)
}

pub(crate) fn convert_to_float(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    convert(ctx, ValueType::Float)
}

fn convert(ctx: &mut Context<'_>, ty: ValueType) -> Result<(), RuntimeError> {
    let value = ctx.stack.pop()?;
    ctx.stack.push(coerce(value, ty)?);
    Ok(())
}

/// `0x80`-`0x83`: drop the top of the stack.
pub(crate) fn discard(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    ctx.stack.pop()?;
    Ok(())
}

/// `0x84`-`0x87`: store the top value at the address beneath it.
pub(crate) fn store(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let ty = family_type(ctx);
    let value = coerce(ctx.stack.pop()?, ty)?;
    let address = ctx.stack.pop_address()?;
    ctx.heap.write(&value, address)
}
