//! File and directory keywords.

use opo_common::Value;

use crate::error::RuntimeError;
use crate::execute::Context;

/// `EXIST(name$)`: -1 if the file exists, otherwise 0.
pub(crate) fn exist(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let path = ctx.stack.pop_string()?;
    let found = ctx.env.host.exists(&path);
    ctx.stack.push(Value::Word(if found { -1 } else { 0 }));
    Ok(())
}

pub(crate) fn delete(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let path = ctx.stack.pop_string()?;
    ctx.env
        .host
        .delete(&path)
        .map_err(|e| RuntimeError::io("DELETE", &e))
}

pub(crate) fn make_dir(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let path = ctx.stack.pop_string()?;
    ctx.env
        .host
        .make_dir(&path)
        .map_err(|e| RuntimeError::io("MKDIR", &e))
}

pub(crate) fn set_path(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let path = ctx.stack.pop_string()?;
    ctx.env
        .host
        .set_path(&path)
        .map_err(|e| RuntimeError::io("SETPATH", &e))
}

/// `DIR$(pattern$)` starts a listing and returns its first match;
/// `DIR$("")` returns the next one. An exhausted listing returns `""`.
pub(crate) fn dir(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let pattern = ctx.stack.pop_string()?;
    if !pattern.is_empty() {
        let mut entries = ctx
            .env
            .host
            .list_dir(&pattern)
            .map_err(|e| RuntimeError::io("DIR$", &e))?;
        entries.reverse();
        ctx.env.dir_entries = entries;
    }
    let next = ctx.env.dir_entries.pop().unwrap_or_default();
    ctx.stack.push(Value::Str(next));
    Ok(())
}
