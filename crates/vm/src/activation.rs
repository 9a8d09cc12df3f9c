//! Per-call state of a running procedure.

use std::collections::HashMap;
use std::rc::Rc;

use opo_common::{Procedure, Value};

use crate::error::RuntimeError;
use crate::heap::FrameHeap;

/// What the run loop should do after the current instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Stop,
    Return,
    Error,
    /// Call the named procedure.
    Call(String),
}

/// A resolved EE reference: a heap address and the index, in the call
/// stack, of the activation whose frame holds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CachedReference {
    pub(crate) address: usize,
    pub(crate) owner: usize,
}

/// One live invocation of a procedure.
#[derive(Debug)]
pub struct Activation {
    pub(crate) procedure: Rc<Procedure>,
    /// Heap offset of this activation's frame.
    pub(crate) frame: usize,
    pub(crate) pc: usize,
    /// The last opcode byte dispatched (the sub-byte for prefixed opcodes).
    pub(crate) opcode: u8,
    /// Parameter values, parallel to `procedure.parameters`.
    pub(crate) parameters: Vec<Value>,
    pub(crate) ee_cache: HashMap<u16, CachedReference>,
    pub(crate) signal: Option<Signal>,
    /// Set by TRAP; covers the next instruction only.
    pub(crate) trap: bool,
    /// Set by ONERR. Recorded but not used for recovery.
    pub(crate) error_handler: Option<usize>,
    /// Number of call-stack scans performed during EE resolution.
    pub(crate) scans: usize,
}

impl Activation {
    /// Allocates the frame and seeds string capacities and array lengths.
    pub fn new(procedure: Rc<Procedure>, heap: &mut FrameHeap) -> Result<Self, RuntimeError> {
        let frame = heap.allocate(procedure.frame_size as usize)?;
        let seeded = seed_frame(&procedure, frame, heap);
        if let Err(e) = seeded {
            heap.free(frame);
            return Err(e);
        }
        let parameters = procedure
            .parameters
            .iter()
            .map(|p| Value::zero(p.value_type))
            .collect();
        Ok(Self {
            procedure,
            frame,
            pc: 0,
            opcode: 0,
            parameters,
            ee_cache: HashMap::new(),
            signal: None,
            trap: false,
            error_handler: None,
            scans: 0,
        })
    }

    /// Frees the frame.
    pub fn release(self, heap: &mut FrameHeap) {
        heap.free(self.frame);
    }

    pub fn procedure(&self) -> &Procedure {
        &self.procedure
    }

    pub fn frame(&self) -> usize {
        self.frame
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn error_handler(&self) -> Option<usize> {
        self.error_handler
    }

    pub fn resolution_scans(&self) -> usize {
        self.scans
    }

    pub(crate) fn at_end(&self) -> bool {
        self.pc >= self.procedure.bytecode.len()
    }

    fn code(&mut self, len: usize) -> Result<&[u8], RuntimeError> {
        let start = self.pc;
        let end = start + len;
        if end > self.procedure.bytecode.len() {
            return Err(RuntimeError::TruncatedBytecode { pc: start });
        }
        self.pc = end;
        Ok(&self.procedure.bytecode[start..end])
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, RuntimeError> {
        Ok(self.code(1)?[0])
    }

    pub(crate) fn read_i8(&mut self) -> Result<i8, RuntimeError> {
        Ok(self.read_u8()? as i8)
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, RuntimeError> {
        let b = self.code(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub(crate) fn read_i16(&mut self) -> Result<i16, RuntimeError> {
        Ok(self.read_u16()? as i16)
    }

    pub(crate) fn read_i32(&mut self) -> Result<i32, RuntimeError> {
        let b = self.code(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn read_f64(&mut self) -> Result<f64, RuntimeError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.code(8)?);
        Ok(f64::from_le_bytes(raw))
    }

    pub(crate) fn read_qstr(&mut self) -> Result<String, RuntimeError> {
        let len = self.read_u8()? as usize;
        Ok(String::from_utf8_lossy(self.code(len)?).into_owned())
    }

    /// Peeks a little-endian u16 at `pc + offset` without moving.
    pub(crate) fn peek_u16(&self, offset: usize) -> Result<u16, RuntimeError> {
        let at = self.pc + offset;
        self.procedure
            .bytecode
            .get(at..at + 2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]))
            .ok_or(RuntimeError::TruncatedBytecode { pc: at })
    }

    /// Moves the program counter by `delta` bytes. Landing exactly at the
    /// end of the bytecode is allowed and ends the procedure.
    pub(crate) fn jump(&mut self, delta: i64) -> Result<(), RuntimeError> {
        let target = self.pc as i64 + delta;
        if target < 0 || target > self.procedure.bytecode.len() as i64 {
            return Err(RuntimeError::BadJump { target });
        }
        self.pc = target as usize;
        Ok(())
    }
}

fn seed_frame(procedure: &Procedure, frame: usize, heap: &mut FrameHeap) -> Result<(), RuntimeError> {
    for s in &procedure.strings {
        heap.write_byte(frame + s.offset as usize, s.max_length)?;
    }
    for a in &procedure.arrays {
        heap.write(&Value::Word(a.length as i16), frame + a.offset as usize)?;
    }
    Ok(())
}
