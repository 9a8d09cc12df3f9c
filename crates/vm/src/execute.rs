//! Instruction fetch, dispatch and the call/return protocol.

use std::time::Instant;

use opo_common::{Procedure, Value, ValueType};
use tracing::{error, trace, warn};

use crate::activation::{Activation, Signal};
use crate::dispatch::{tables, Entry};
use crate::error::RuntimeError;
use crate::heap::FrameHeap;
use crate::host::Host;
use crate::procedures::ProcedureTable;
use crate::rng::Rng;
use crate::stack::OperandStack;

/// Input an executable can be waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwaitKind {
    /// GET: a key code.
    Key,
    /// GET$: a key as a one-character string.
    KeyString,
    /// PAUSE 0: any key.
    Pause,
    /// DIALOG: the dialog's result.
    Dialog,
    /// MENU: the selected item.
    Menu,
}

/// Input delivered by the host to a waiting executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Key(i16),
    Dialog(i16),
    Menu(i16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Await {
    Input(AwaitKind),
    Until(Instant),
}

/// Executable-wide state reachable from opcode handlers.
pub(crate) struct Environment {
    pub(crate) procedures: ProcedureTable,
    pub(crate) host: Box<dyn Host>,
    pub(crate) awaiting: Option<Await>,
    pub(crate) last_key: i16,
    pub(crate) last_error: i16,
    pub(crate) rng: Rng,
    /// Logical file the database keywords act on.
    pub(crate) current_database: u8,
    pub(crate) dialog: DialogState,
    /// Variable `MENU(var%)` writes the highlighted item back to.
    pub(crate) menu_var: Option<usize>,
    /// Remaining `DIR$` matches, next one last.
    pub(crate) dir_entries: Vec<String>,
}

/// The dialog being built since the last `dINIT`.
#[derive(Debug, Default)]
pub(crate) struct DialogState {
    /// Lines added so far.
    pub(crate) lines: usize,
    /// Editable lines as `(line, variable address, variable type)`.
    pub(crate) fields: Vec<(usize, usize, ValueType)>,
}

/// What an opcode handler can see: the current activation, the
/// activations below it, the heap, the operand stack and the environment.
pub(crate) struct Context<'a> {
    pub(crate) activation: &'a mut Activation,
    pub(crate) outer: &'a [Activation],
    pub(crate) heap: &'a mut FrameHeap,
    pub(crate) stack: &'a mut OperandStack,
    pub(crate) env: &'a mut Environment,
}

impl Context<'_> {
    /// Procedure and frame of the activation at `index` in the call stack.
    pub(crate) fn frame_of(&self, index: usize) -> (&Procedure, usize) {
        match self.outer.get(index) {
            Some(a) => (&a.procedure, a.frame),
            None => (&self.activation.procedure, self.activation.frame),
        }
    }

    /// Index of the current activation in the call stack.
    pub(crate) fn current_index(&self) -> usize {
        self.outer.len()
    }
}

/// Executes one instruction of the current activation.
///
/// Control-flow outcomes are reported through the activation's signal.
/// An `Err` is fatal to the run; errors raised while TRAP is armed are
/// recorded for `ERR` and execution continues instead.
pub(crate) fn step(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    if ctx.activation.at_end() {
        ctx.activation.signal = Some(Signal::Return);
        return Ok(());
    }

    let at = ctx.activation.pc;
    let opcode = ctx.activation.read_u8()?;
    ctx.activation.opcode = opcode;
    trace!(procedure = %ctx.activation.procedure.name, pc = at, opcode, "step");

    let trapped = std::mem::take(&mut ctx.activation.trap);
    let result = match tables().primary[opcode as usize] {
        Entry::Op(handler) => handler(ctx),
        Entry::Prefix(prefix) => dispatch_prefixed(ctx, prefix),
        Entry::Call => call_procedure(ctx),
        Entry::IndirectCall => indirect_call(ctx),
        Entry::Return(default) => {
            if let Some(ty) = default {
                ctx.stack.push(Value::zero(ty));
            }
            ctx.activation.signal = Some(Signal::Return);
            Ok(())
        }
        Entry::Unassigned => {
            unassigned(ctx, at, opcode, None);
            Ok(())
        }
    };

    match result {
        Err(e) if trapped && !e.is_internal() => {
            warn!(
                procedure = %ctx.activation.procedure.name,
                pc = at,
                opcode,
                error = %e,
                "error trapped"
            );
            ctx.env.last_error = e.code();
            Ok(())
        }
        other => other,
    }
}

fn dispatch_prefixed(
    ctx: &mut Context<'_>,
    prefix: opo_common::Prefix,
) -> Result<(), RuntimeError> {
    let at = ctx.activation.pc - 1;
    let sub = ctx.activation.read_u8()?;
    ctx.activation.opcode = sub;
    match tables().secondary[prefix.table_index()][sub as usize] {
        Some(handler) => handler(ctx),
        None => {
            unassigned(ctx, at, prefix as u8, Some(sub));
            Ok(())
        }
    }
}

fn unassigned(ctx: &mut Context<'_>, at: usize, opcode: u8, sub: Option<u8>) {
    error!(
        procedure = %ctx.activation.procedure.name,
        pc = at,
        opcode,
        sub_opcode = ?sub,
        "no handler for opcode"
    );
    ctx.activation.signal = Some(Signal::Error);
}

/// `0x53`: call the procedure named by an EE reference.
fn call_procedure(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let ee = ctx.activation.read_u16()?;
    let procedure = &ctx.activation.procedure;
    let name = procedure
        .called_by_ee(ee)
        .map(|c| c.name.clone())
        .ok_or_else(|| RuntimeError::UnresolvedReference {
            procedure: procedure.name.clone(),
            ee,
        })?;
    ctx.activation.signal = Some(Signal::Call(name));
    Ok(())
}

/// `0x6B`: call through a name on the operand stack. The argument
/// descriptors above the name are discarded unchecked.
fn indirect_call(ctx: &mut Context<'_>) -> Result<(), RuntimeError> {
    let arg_count = ctx.activation.read_u8()?;
    let return_type = ctx.activation.read_u8()?;
    for _ in 0..arg_count {
        ctx.stack.pop()?;
        ctx.stack.pop()?;
    }
    let mut name = ctx.stack.pop_string()?;
    if return_type != 0 {
        name.push(char::from(return_type));
    }
    ctx.activation.signal = Some(Signal::Call(name));
    Ok(())
}
