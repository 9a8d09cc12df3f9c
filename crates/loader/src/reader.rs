//! Parsing of object file images into [`ObjectFile`] structures.

use opo_common::object_file::{EMBEDDED_OPA_LENGTH, SIGNATURE};
use opo_common::{
    ArrayDeclaration, EmbeddedFile, EmbeddedKind, Header, ObjectFile, Procedure,
    ProcedureSections, StringDeclaration,
};
use tracing::{debug, info};

use crate::cursor::Cursor;
use crate::error::LoadError;

/// Parses a complete object file image.
pub fn load(bytes: &[u8]) -> Result<ObjectFile, LoadError> {
    let header = read_header(bytes)?;
    let embedded = read_embedded(bytes, &header)?;
    if !embedded.is_empty() {
        info!(count = embedded.len(), "embedded resources found");
    }

    let mut procedures = Vec::new();
    for entry in read_procedure_table(bytes, header.procedure_table_offset as usize)? {
        let proc = read_procedure(bytes, &header, entry)?;
        debug!(
            name = %proc.name,
            offset = proc.bytecode_offset,
            frame_size = proc.frame_size,
            bytecode_len = proc.bytecode.len(),
            "procedure loaded"
        );
        procedures.push(proc);
    }
    info!(
        source = %header.source_filename,
        procedures = procedures.len(),
        "object file loaded"
    );

    Ok(ObjectFile {
        header,
        embedded,
        procedures,
    })
}

/// Reads the fixed header, the source filename and the second header.
pub fn read_header(bytes: &[u8]) -> Result<Header, LoadError> {
    let mut c = Cursor::new(bytes, 0);
    let signature = c.take(SIGNATURE.len()).map_err(|_| LoadError::BadSignature)?;
    if signature != SIGNATURE {
        return Err(LoadError::BadSignature);
    }
    c.read_u8()?;
    let format_version = c.read_u16()?;
    let second_header_offset = c.read_u16()?;
    let source_filename = c.read_qstr()?;

    let mut c = Cursor::new(bytes, second_header_offset as usize);
    let file_length = c.read_u32()?;
    let translator_version = c.read_u16()?;
    let required_runtime_version = c.read_u16()?;
    let procedure_table_offset = c.read_u32()?;

    Ok(Header {
        format_version,
        second_header_offset,
        source_filename,
        file_length,
        translator_version,
        required_runtime_version,
        procedure_table_offset,
    })
}

/// Locates embedded resources between the source filename and the second
/// header. Each is a 2-byte length followed by the payload.
pub fn read_embedded(bytes: &[u8], header: &Header) -> Result<Vec<EmbeddedFile>, LoadError> {
    let limit = header.second_header_offset as usize;
    let mut c = Cursor::new(bytes, header.embedded_start());
    let mut files = Vec::new();

    while c.offset() < limit {
        let length = c.read_u16()?;
        let start = c.offset();
        let payload = c.take(length as usize)?;
        if c.offset() > limit {
            return Err(LoadError::EmbeddedOverrun {
                offset: start,
                limit,
            });
        }
        let kind = if payload.starts_with(b"PIC") {
            EmbeddedKind::Image
        } else if length == EMBEDDED_OPA_LENGTH {
            EmbeddedKind::Opa
        } else {
            EmbeddedKind::Unknown
        };
        files.push(EmbeddedFile {
            start,
            end: c.offset(),
            kind,
        });
    }

    Ok(files)
}

/// One procedure-table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    pub name: String,
    pub offset: u32,
    pub source_line: u16,
}

/// Reads procedure-table entries until the empty-name terminator.
pub fn read_procedure_table(bytes: &[u8], offset: usize) -> Result<Vec<TableEntry>, LoadError> {
    let mut c = Cursor::new(bytes, offset);
    let mut entries = Vec::new();
    loop {
        let name = c.read_qstr()?;
        if name.is_empty() {
            break;
        }
        let offset = c.read_u32()?;
        let source_line = c.read_u16()?;
        entries.push(TableEntry {
            name,
            offset,
            source_line,
        });
    }
    Ok(entries)
}

/// Parses the body of one procedure starting at its table offset.
pub fn read_procedure(
    bytes: &[u8],
    header: &Header,
    entry: TableEntry,
) -> Result<Procedure, LoadError> {
    let mut c = Cursor::new(bytes, entry.offset as usize);

    let optimisation_section_size = if header.has_optimisation_sections() {
        Some(c.read_u16()?)
    } else {
        None
    };
    let frame_size = c.read_u16()?;
    let bytecode_len = c.read_u16()?;
    let max_stack = c.read_u16()?;

    let parameter_count = c.read_u8()?;
    let mut parameter_types = Vec::with_capacity(parameter_count as usize);
    for _ in 0..parameter_count {
        parameter_types.push(c.read_value_type()?);
    }

    let section_size = c.read_u16()? as usize;
    let section_end = c.offset() + section_size;
    let mut globals = Vec::new();
    while c.offset() < section_end {
        let name = c.read_qstr()?;
        let value_type = c.read_value_type()?;
        let offset = c.read_u16()?;
        globals.push((name, value_type, offset));
    }

    let section_size = c.read_u16()? as usize;
    let section_end = c.offset() + section_size;
    let mut called = Vec::new();
    while c.offset() < section_end {
        let name = c.read_qstr()?;
        let arg_count = c.read_u8()?;
        called.push((name, arg_count));
    }

    let mut global_references = Vec::new();
    loop {
        let name = c.read_qstr()?;
        if name.is_empty() {
            break;
        }
        global_references.push((name, c.read_value_type()?));
    }

    let mut strings = Vec::new();
    loop {
        let offset = c.read_u16()?;
        if offset == 0 {
            break;
        }
        let max_length = c.read_u8()?;
        strings.push(StringDeclaration { offset, max_length });
    }

    let mut arrays = Vec::new();
    loop {
        let offset = c.read_u16()?;
        if offset == 0 {
            break;
        }
        let length = c.read_u16()?;
        arrays.push(ArrayDeclaration { offset, length });
    }

    let bytecode = c.take(bytecode_len as usize)?.to_vec();

    Ok(Procedure::new(ProcedureSections {
        name: entry.name,
        source_line: entry.source_line,
        bytecode_offset: entry.offset,
        optimisation_section_size,
        frame_size,
        max_stack,
        parameter_types,
        globals,
        called,
        global_references,
        strings,
        arrays,
        bytecode,
    }))
}
