//! Database keywords. Files are addressed by logical handle; the last
//! file opened, created or selected with `USE` is the current one.

use opo_common::ValueType;
use tracing::debug;

use crate::error::RuntimeError;
use crate::execute::Context;
use crate::host::FieldSpec;

/// Ends the inline field list of `OPEN` and `CREATE`.
const FIELD_LIST_END: u8 = 0xFF;

/// Reads the inline logical handle and field list that follow `OPEN` and
/// `CREATE`: type bytes each followed by a name, ending with `0xFF`.
fn field_list(ctx: &mut Context<'_>) -> Result<(u8, Vec<FieldSpec>), RuntimeError> {
    let handle = ctx.activation.read_u8()?;
    let mut fields = Vec::new();
    loop {
        let code = ctx.activation.read_u8()?;
        if code == FIELD_LIST_END {
            break;
        }
        let value_type = ValueType::try_from(code).map_err(|_| RuntimeError::InvalidArgument)?;
        let name = ctx.activation.read_qstr()?;
        fields.push(FieldSpec { value_type, name });
    }
    Ok((handle, fields))
}

/// `OPEN file$, A, field1, ...`.
pub(crate) fn open(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let path = ctx.stack.pop_string()?;
    let (handle, fields) = field_list(ctx)?;
    debug!(handle, %path, fields = fields.len(), "open");
    ctx.env
        .host
        .open(handle, &path, &fields)
        .map_err(|e| RuntimeError::io("OPEN", &e))?;
    ctx.env.current_database = handle;
    Ok(())
}

/// `CREATE file$, A, field1, ...`.
pub(crate) fn create(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let path = ctx.stack.pop_string()?;
    let (handle, fields) = field_list(ctx)?;
    debug!(handle, %path, fields = fields.len(), "create");
    ctx.env
        .host
        .create(handle, &path, &fields)
        .map_err(|e| RuntimeError::io("CREATE", &e))?;
    ctx.env.current_database = handle;
    Ok(())
}

/// `USE A`.
pub(crate) fn use_file(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    ctx.env.current_database = ctx.activation.read_u8()?;
    Ok(())
}

pub(crate) fn close(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let handle = ctx.env.current_database;
    ctx.env
        .host
        .close(handle)
        .map_err(|e| RuntimeError::io("CLOSE", &e))
}

pub(crate) fn append(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let handle = ctx.env.current_database;
    ctx.env
        .host
        .append(handle)
        .map_err(|e| RuntimeError::io("APPEND", &e))
}

pub(crate) fn update(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let handle = ctx.env.current_database;
    ctx.env
        .host
        .update(handle)
        .map_err(|e| RuntimeError::io("UPDATE", &e))
}
