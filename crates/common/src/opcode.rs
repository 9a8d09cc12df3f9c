//! Bytecode bytes with fixed meaning for the interpreter core.
//!
//! Ordinary opcodes are looked up in dispatch tables; the bytes here are
//! the ones the execution engine handles itself (calls, returns) or that
//! select a secondary table.

/// `0x53`: call the procedure named by a 2-byte EE reference.
pub const CALL_PROCEDURE: u8 = 0x53;

/// `0x6B`: indirect (`@`) call through a name on the operand stack.
pub const INDIRECT_CALL: u8 = 0x6B;

/// `0x74`-`0x77`: return without a value, pushing the default of the
/// procedure's result type (Word, Long, Float, String).
pub const RETURN_ZERO_WORD: u8 = 0x74;
pub const RETURN_ZERO_LONG: u8 = 0x75;
pub const RETURN_ZERO_FLOAT: u8 = 0x76;
pub const RETURN_ZERO_STRING: u8 = 0x77;

/// `0xC0`: return with the value already on the operand stack.
pub const RETURN: u8 = 0xC0;

/// Prefix bytes that select a secondary dispatch table for the byte that
/// follows them.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Prefix {
    /// `0x57`: functions (string, maths, memory, keyboard).
    Function = 0x57,
    /// `0xED`: extended commands (dialog items).
    Extended = 0xED,
    /// `0xFF`: further commands (screen font and style, caching).
    Other = 0xFF,
}

/// All prefixes, in byte order.
pub const ALL_PREFIXES: [Prefix; 3] = [Prefix::Function, Prefix::Extended, Prefix::Other];

impl Prefix {
    /// Returns the prefix selected by `byte`, if any.
    pub fn from_byte(byte: u8) -> Option<Prefix> {
        match byte {
            0x57 => Some(Prefix::Function),
            0xED => Some(Prefix::Extended),
            0xFF => Some(Prefix::Other),
            _ => None,
        }
    }

    /// Index of this prefix's secondary table.
    pub fn table_index(&self) -> usize {
        match self {
            Prefix::Function => 0,
            Prefix::Extended => 1,
            Prefix::Other => 2,
        }
    }
}
