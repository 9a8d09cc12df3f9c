//! Shared types for OPL object files and their interpreter.
//!
//! - [`ValueType`]: the five value kinds (Word, Long, Float, String, Address)
//! - [`Value`]: a typed runtime value
//! - [`Procedure`]: a static procedure descriptor with EE reference numbering
//! - [`ObjectFile`], [`Header`], [`EmbeddedFile`]: file-level structures
//! - [`opcode`]: bytecode bytes the execution engine treats specially
//! - [`DecodeError`]: errors from decoding type codes and strings

pub mod error;
pub mod object_file;
pub mod opcode;
pub mod procedure;
pub mod value;
pub mod value_type;

pub use error::DecodeError;
pub use object_file::{EmbeddedFile, EmbeddedKind, Header, ObjectFile};
pub use opcode::Prefix;
pub use procedure::{
    ArrayDeclaration, CalledProcedure, GlobalDeclaration, GlobalReference, Parameter, Procedure,
    ProcedureSections, StringDeclaration,
};
pub use value::Value;
pub use value_type::ValueType;
