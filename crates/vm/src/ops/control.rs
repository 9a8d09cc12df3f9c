//! Branches, error handling, STOP and LOADM.

use opo_common::Value;
use tracing::debug;

use crate::activation::Signal;
use crate::error::{describe, RuntimeError};
use crate::execute::Context;

// Branch offsets are relative to the first byte of the branching opcode.
// After the opcode and a Word operand have been read, that is 3 bytes back.
const BRANCH_OPERAND_END: i64 = 3;

/// `0x5B`: pop a condition and branch when it is false.
pub(crate) fn branch_if_false(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let offset = ctx.activation.read_i16()?;
    let condition = ctx.stack.pop()?;
    if !condition.is_truthy() {
        ctx.activation.jump(i64::from(offset) - BRANCH_OPERAND_END)?;
    }
    Ok(())
}

/// `0xBF`: unconditional branch.
pub(crate) fn goto(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let offset = ctx.activation.read_i16()?;
    ctx.activation.jump(i64::from(offset) - BRANCH_OPERAND_END)
}

/// `0xAB`: computed branch. The operand is a label count followed by that
/// many offsets; an index outside `1..=count` falls through past the list.
pub(crate) fn vector(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let count = ctx.activation.peek_u16(0)?;
    let index = ctx.stack.pop_int()?;
    if index < 1 || index > i32::from(count) {
        return ctx.activation.jump(2 + 2 * i64::from(count));
    }
    let slot = 2 + 2 * (index as usize - 1);
    let offset = ctx.activation.peek_u16(slot)?;
    // Relative to the opcode byte, which is one behind the pc.
    ctx.activation.jump(i64::from(offset) - 1)
}

/// `0xB1`: record the ONERR handler; an offset of zero clears it.
pub(crate) fn on_error(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let opcode_at = ctx.activation.pc - 1;
    let offset = ctx.activation.read_i16()?;
    ctx.activation.error_handler = if offset == 0 {
        None
    } else {
        let target = opcode_at as i64 + i64::from(offset);
        Some(usize::try_from(target).map_err(|_| RuntimeError::BadJump { target })?)
    };
    debug!(
        procedure = %ctx.activation.procedure.name,
        handler = ?ctx.activation.error_handler,
        "ONERR"
    );
    Ok(())
}

pub(crate) fn stop(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    ctx.activation.signal = Some(Signal::Stop);
    Ok(())
}

/// `0xBC`: arm TRAP for the next instruction.
pub(crate) fn trap(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    ctx.activation.trap = true;
    Ok(())
}

/// `ERR`: code of the last trapped error.
pub(crate) fn err(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    ctx.stack.push(Value::Word(ctx.env.last_error));
    Ok(())
}

/// `ERR$(code)`.
pub(crate) fn err_string(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let code = ctx.stack.pop_int()?;
    let text = i16::try_from(code).map(describe).unwrap_or_else(|_| describe(i16::MIN));
    ctx.stack.push(Value::Str(text.to_string()));
    Ok(())
}

/// `0xAE`: `LOADM name$`. The image comes from the host and is parsed by
/// the loader; its procedures become callable by name.
pub(crate) fn load_module(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let name = ctx.stack.pop_string()?;
    if ctx.env.procedures.is_loaded(&name) {
        return Err(RuntimeError::ModuleAlreadyLoaded { name });
    }
    let image = ctx
        .env
        .host
        .read_module(&name)
        .map_err(|e| RuntimeError::ModuleLoad {
            name: name.clone(),
            reason: e.to_string(),
        })?;
    let module = opo_loader::load(&image).map_err(|e| RuntimeError::ModuleLoad {
        name: name.clone(),
        reason: e.to_string(),
    })?;
    ctx.env.procedures.add_module(&name, module)
}
