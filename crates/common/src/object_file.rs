//! File-level structures of an OPO/OPA object file.

use serde::Serialize;

use crate::procedure::Procedure;

/// The 15-byte signature at the start of every object file.
pub const SIGNATURE: &[u8; 15] = b"OPLObjectFile**";

/// Translator versions at or above this carry an optimisation-section
/// size before each procedure's frame size.
pub const OPTIMISATION_SECTION_VERSION: u16 = 0x111F;

/// Size in bytes of an embedded OPA sub-module header block.
pub const EMBEDDED_OPA_LENGTH: u16 = 36;

/// Fields of both file headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    pub format_version: u16,
    pub second_header_offset: u16,
    pub source_filename: String,
    pub file_length: u32,
    pub translator_version: u16,
    pub required_runtime_version: u16,
    pub procedure_table_offset: u32,
}

impl Header {
    /// Where embedded resources start, if the file has any.
    pub fn embedded_start(&self) -> usize {
        20 + 1 + self.source_filename.len()
    }

    pub fn has_optimisation_sections(&self) -> bool {
        self.translator_version >= OPTIMISATION_SECTION_VERSION
    }
}

/// What an embedded resource appears to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EmbeddedKind {
    /// Payload starts with `PIC`: a bitmap image.
    Image,
    /// A 36-byte OPA application header.
    Opa,
    Unknown,
}

/// Location of an embedded resource within the file image. The payload
/// is not copied out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EmbeddedFile {
    pub start: usize,
    pub end: usize,
    pub kind: EmbeddedKind,
}

impl EmbeddedFile {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A fully parsed object file: the result of a successful load.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectFile {
    pub header: Header,
    pub embedded: Vec<EmbeddedFile>,
    /// Procedures in procedure-table order; the first is the entry point.
    pub procedures: Vec<Procedure>,
}

impl ObjectFile {
    /// The entry procedure, if the table is not empty.
    pub fn entry(&self) -> Option<&Procedure> {
        self.procedures.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(name: &str, translator_version: u16) -> Header {
        Header {
            format_version: 0x10,
            second_header_offset: 0,
            source_filename: name.into(),
            file_length: 0,
            translator_version,
            required_runtime_version: 0x111F,
            procedure_table_offset: 0,
        }
    }

    #[test]
    fn embedded_start_follows_source_name() {
        assert_eq!(header("C:\\HELLO.OPL", 0).embedded_start(), 33);
    }

    #[test]
    fn optimisation_sections_by_version() {
        assert!(!header("A", 0x111E).has_optimisation_sections());
        assert!(header("A", 0x111F).has_optimisation_sections());
        assert!(header("A", 0x2000).has_optimisation_sections());
    }

    #[test]
    fn embedded_len() {
        let file = EmbeddedFile {
            start: 40,
            end: 76,
            kind: EmbeddedKind::Opa,
        };
        assert_eq!(file.len(), 36);
        assert!(!file.is_empty());
    }
}
