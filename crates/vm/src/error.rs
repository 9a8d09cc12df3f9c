//! Runtime errors for the OPL interpreter.
//!
//! Each error maps to the legacy runtime's numeric error code through
//! [`RuntimeError::code`], which is what `ERR` reports after a trapped
//! failure.

use std::io;

use opo_common::ValueType;
use thiserror::Error;

/// Errors that occur while executing bytecode.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    /// Pop from an empty operand stack. Never recoverable, even under TRAP.
    #[error("operand stack underflow")]
    StackUnderflow,

    /// No free heap range is large enough.
    #[error("out of memory: no free range of {requested} bytes")]
    OutOfMemory { requested: usize },

    /// An EE reference matched no global, imported global or parameter.
    #[error("unresolved EE reference {ee} in {procedure}")]
    UnresolvedReference { procedure: String, ee: u16 },

    /// A call named a procedure that is not in the procedure table.
    #[error("procedure not found: {name}")]
    ProcedureNotFound { name: String },

    /// A call argument's type tag disagrees with the declared parameter.
    #[error("parameter {index} of {procedure}: expected {expected:?}, got type code {found}")]
    ParameterTypeMismatch {
        procedure: String,
        index: usize,
        expected: ValueType,
        found: i32,
    },

    /// Array subscript below 1 or above the declared element count.
    #[error("array index {index} out of bounds")]
    ArrayIndexOutOfBounds { index: i32 },

    #[error("divide by zero")]
    DivideByZero,

    /// Integer result does not fit the operand width, or a float result
    /// is infinite.
    #[error("overflow")]
    Overflow,

    /// An operand had the wrong type for the operation.
    #[error("type mismatch: expected {expected:?}, found {found:?}")]
    TypeMismatch {
        expected: ValueType,
        found: ValueType,
    },

    /// A heap access fell outside the heap.
    #[error("address {address} out of range (heap size {size})")]
    AddressOutOfRange { address: usize, size: usize },

    /// A function argument was outside its domain.
    #[error("invalid argument")]
    InvalidArgument,

    /// A position or character code outside the range a function accepts.
    #[error("argument {value} out of range")]
    OutOfRange { value: i64 },

    /// An inline operand ran past the end of the procedure's bytecode.
    #[error("truncated bytecode at pc {pc}")]
    TruncatedBytecode { pc: usize },

    /// A branch target fell outside the procedure's bytecode.
    #[error("jump target {target} outside bytecode")]
    BadJump { target: i64 },

    #[error("call depth limit {limit} exceeded")]
    CallDepthExceeded { limit: usize },

    /// A string longer than a length byte can describe.
    #[error("string too long: {len} bytes")]
    StringTooLong { len: usize },

    #[error("cannot load module {name}: {reason}")]
    ModuleLoad { name: String, reason: String },

    #[error("module already loaded: {name}")]
    ModuleAlreadyLoaded { name: String },

    /// The database collaborator has no such field.
    #[error("field not found: {field}")]
    FieldNotFound { field: String },

    /// A database, file or device operation failed in the host.
    #[error("{operation} failed: {reason}")]
    Io {
        operation: &'static str,
        code: i16,
        reason: String,
    },
}

impl RuntimeError {
    /// The legacy runtime's error code for this error.
    pub fn code(&self) -> i16 {
        match self {
            RuntimeError::StackUnderflow => -1,
            RuntimeError::OutOfMemory { .. } => -10,
            RuntimeError::UnresolvedReference { .. } => -98,
            RuntimeError::ProcedureNotFound { .. } => -99,
            RuntimeError::ParameterTypeMismatch { .. } => -110,
            RuntimeError::ArrayIndexOutOfBounds { .. } => -7,
            RuntimeError::DivideByZero => -8,
            RuntimeError::Overflow => -6,
            RuntimeError::TypeMismatch { .. } => -80,
            RuntimeError::AddressOutOfRange { .. } => -7,
            RuntimeError::InvalidArgument => -2,
            RuntimeError::OutOfRange { .. } => -7,
            RuntimeError::TruncatedBytecode { .. } => -96,
            RuntimeError::BadJump { .. } => -96,
            RuntimeError::CallDepthExceeded { .. } => -10,
            RuntimeError::StringTooLong { .. } => -112,
            RuntimeError::ModuleLoad { .. } => -106,
            RuntimeError::ModuleAlreadyLoaded { .. } => -104,
            RuntimeError::FieldNotFound { .. } => -100,
            RuntimeError::Io { code, .. } => *code,
        }
    }

    /// Wraps a host I/O failure, keeping the error code its kind maps to.
    pub fn io(operation: &'static str, e: &io::Error) -> Self {
        RuntimeError::Io {
            operation,
            code: io_code(e),
            reason: e.to_string(),
        }
    }

    /// Internal errors indicate a broken program or interpreter and are
    /// never swallowed by TRAP.
    pub fn is_internal(&self) -> bool {
        matches!(self, RuntimeError::StackUnderflow)
    }
}

/// Error code for a host I/O failure, as the `IO` keywords return it.
pub fn io_code(e: &io::Error) -> i16 {
    match e.kind() {
        io::ErrorKind::NotFound => -33,
        io::ErrorKind::AlreadyExists => -32,
        io::ErrorKind::UnexpectedEof => -36,
        io::ErrorKind::PermissionDenied => -39,
        io::ErrorKind::Unsupported => -4,
        _ => -1,
    }
}

/// Text for an error code, as returned by `ERR$`.
pub fn describe(code: i16) -> &'static str {
    match code {
        0 => "",
        -1 => "General failure",
        -2 => "Invalid arguments",
        -4 => "Service not supported",
        -6 => "Overflow (number too large)",
        -7 => "Out of range",
        -8 => "Divide by zero",
        -10 => "No system memory",
        -32 => "File already exists",
        -33 => "File does not exist",
        -36 => "End of file",
        -39 => "Access denied",
        -46 => "I/O pending",
        -80 => "Type mismatch",
        -96 => "Illegal opcode",
        -98 => "Undefined externals",
        -99 => "Procedure not found",
        -100 => "Field not found",
        -104 => "Module already loaded",
        -106 => "Module does not exist",
        -110 => "Type violation",
        -111 => "Subscript or dimension error",
        -112 => "String too long",
        _ => "Unknown error",
    }
}
