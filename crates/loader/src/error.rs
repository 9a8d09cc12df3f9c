//! Error types for loading object files.

use thiserror::Error;

/// Errors produced while parsing an object file image.
///
/// A load either fully succeeds or returns one of these; no partial
/// object file is ever produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The file does not start with `OPLObjectFile**`.
    #[error("bad signature: not an OPL object file")]
    BadSignature,

    /// A read ran past the end of the image.
    #[error("truncated file: needed {needed} byte(s) at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    /// A declaration carried a type code outside 0-4.
    #[error("invalid value type code {code} at offset {offset}")]
    InvalidValueType { offset: usize, code: u8 },

    /// An embedded resource overlaps the second header.
    #[error("embedded resource at offset {offset} runs past the second header at {limit}")]
    EmbeddedOverrun { offset: usize, limit: usize },

    /// The file could not be read from disk.
    #[error("cannot read {path}: {message}")]
    Io { path: String, message: String },
}

/// Errors produced while building an object file image.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WriteError {
    /// A control entry at offset 0 would read back as the end of its
    /// section.
    #[error("{section} control entry in {procedure} has offset 0")]
    ZeroControlOffset {
        procedure: String,
        section: &'static str,
    },
}
