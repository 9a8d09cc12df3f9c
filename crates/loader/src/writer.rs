//! Serialisation of procedures into object file images.
//!
//! The writer is the inverse of [`crate::load`]: loading a written image
//! yields the same procedure sections. It is used to build fixtures and
//! to re-emit loaded files.

use opo_common::object_file::{OPTIMISATION_SECTION_VERSION, SIGNATURE};
use opo_common::{ObjectFile, ProcedureSections};

use crate::error::WriteError;

/// Builder for an object file image.
#[derive(Debug, Clone)]
pub struct ObjectFileWriter {
    source_filename: String,
    format_version: u16,
    translator_version: u16,
    required_runtime_version: u16,
    resources: Vec<Vec<u8>>,
    procedures: Vec<ProcedureSections>,
}

impl ObjectFileWriter {
    pub fn new(source_filename: &str) -> Self {
        Self {
            source_filename: source_filename.to_string(),
            format_version: 0x10,
            translator_version: OPTIMISATION_SECTION_VERSION,
            required_runtime_version: OPTIMISATION_SECTION_VERSION,
            resources: Vec::new(),
            procedures: Vec::new(),
        }
    }

    /// Starts from a loaded file, copying resource payloads out of `image`.
    pub fn from_object(object: &ObjectFile, image: &[u8]) -> Self {
        let header = &object.header;
        Self {
            source_filename: header.source_filename.clone(),
            format_version: header.format_version,
            translator_version: header.translator_version,
            required_runtime_version: header.required_runtime_version,
            resources: object
                .embedded
                .iter()
                .map(|e| image[e.start..e.end].to_vec())
                .collect(),
            procedures: object.procedures.iter().map(|p| p.sections()).collect(),
        }
    }

    pub fn format_version(mut self, version: u16) -> Self {
        self.format_version = version;
        self
    }

    pub fn translator_version(mut self, version: u16) -> Self {
        self.translator_version = version;
        self
    }

    pub fn runtime_version(mut self, version: u16) -> Self {
        self.required_runtime_version = version;
        self
    }

    /// Appends an embedded resource payload.
    pub fn resource(mut self, payload: Vec<u8>) -> Self {
        self.resources.push(payload);
        self
    }

    /// Appends a procedure. The first procedure added is the entry point.
    pub fn procedure(mut self, sections: ProcedureSections) -> Self {
        self.procedures.push(sections);
        self
    }

    /// Emits the image. Fails if a procedure cannot be represented.
    pub fn finish(self) -> Result<Vec<u8>, WriteError> {
        let mut out = Vec::new();
        out.extend_from_slice(SIGNATURE);
        out.push(0);
        put_u16(&mut out, self.format_version);
        put_u16(&mut out, 0);
        put_qstr(&mut out, &self.source_filename);

        for payload in &self.resources {
            put_u16(&mut out, payload.len() as u16);
            out.extend_from_slice(payload);
        }

        let second_header_offset = out.len();
        out[18..20].copy_from_slice(&(second_header_offset as u16).to_le_bytes());
        out.extend_from_slice(&[0; 12]);

        let with_optimisation = self.translator_version >= OPTIMISATION_SECTION_VERSION;
        let mut table = Vec::new();
        for sections in &self.procedures {
            let offset = out.len() as u32;
            encode_procedure(&mut out, sections, with_optimisation)?;
            table.push((sections.name.as_str(), offset, sections.source_line));
        }

        let table_offset = out.len() as u32;
        for (name, offset, line) in table {
            put_qstr(&mut out, name);
            put_u32(&mut out, offset);
            put_u16(&mut out, line);
        }
        out.push(0);

        let file_length = out.len() as u32;
        let mut second = Vec::with_capacity(12);
        put_u32(&mut second, file_length);
        put_u16(&mut second, self.translator_version);
        put_u16(&mut second, self.required_runtime_version);
        put_u32(&mut second, table_offset);
        out[second_header_offset..second_header_offset + 12].copy_from_slice(&second);

        Ok(out)
    }
}

/// Appends one procedure body in file layout.
///
/// String and array control sections end at a zero offset, so no entry
/// may sit at offset 0. Nothing is appended when that check fails.
pub fn encode_procedure(
    out: &mut Vec<u8>,
    sections: &ProcedureSections,
    with_optimisation: bool,
) -> Result<(), WriteError> {
    let zero = |section| WriteError::ZeroControlOffset {
        procedure: sections.name.clone(),
        section,
    };
    if sections.strings.iter().any(|s| s.offset == 0) {
        return Err(zero("string"));
    }
    if sections.arrays.iter().any(|a| a.offset == 0) {
        return Err(zero("array"));
    }

    if with_optimisation {
        put_u16(out, sections.optimisation_section_size.unwrap_or(0));
    }
    put_u16(out, sections.frame_size);
    put_u16(out, sections.bytecode.len() as u16);
    put_u16(out, sections.max_stack);

    out.push(sections.parameter_types.len() as u8);
    out.extend(sections.parameter_types.iter().map(|t| *t as u8));

    let mut section = Vec::new();
    for (name, value_type, offset) in &sections.globals {
        put_qstr(&mut section, name);
        section.push(*value_type as u8);
        put_u16(&mut section, *offset);
    }
    put_u16(out, section.len() as u16);
    out.extend_from_slice(&section);

    section.clear();
    for (name, arg_count) in &sections.called {
        put_qstr(&mut section, name);
        section.push(*arg_count);
    }
    put_u16(out, section.len() as u16);
    out.extend_from_slice(&section);

    for (name, value_type) in &sections.global_references {
        put_qstr(out, name);
        out.push(*value_type as u8);
    }
    out.push(0);

    for s in &sections.strings {
        put_u16(out, s.offset);
        out.push(s.max_length);
    }
    put_u16(out, 0);

    for a in &sections.arrays {
        put_u16(out, a.offset);
        put_u16(out, a.length);
    }
    put_u16(out, 0);

    out.extend_from_slice(&sections.bytecode);
    Ok(())
}

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_qstr(out: &mut Vec<u8>, s: &str) {
    let bytes = &s.as_bytes()[..s.len().min(255)];
    out.push(bytes.len() as u8);
    out.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use opo_common::{ArrayDeclaration, StringDeclaration, ValueType};

    #[test]
    fn empty_file_layout() {
        let image = ObjectFileWriter::new("AB").finish().unwrap();
        assert_eq!(&image[..15], SIGNATURE);
        // 20 fixed bytes + qstr "AB" + 12-byte second header + terminator
        assert_eq!(image.len(), 20 + 3 + 12 + 1);
        assert_eq!(u16::from_le_bytes([image[18], image[19]]), 23);
    }

    #[test]
    fn section_sizes_exclude_size_field() {
        let sections = ProcedureSections {
            name: "P".into(),
            globals: vec![("G%".into(), ValueType::Word, 2)],
            ..ProcedureSections::default()
        };
        let mut out = Vec::new();
        encode_procedure(&mut out, &sections, false).unwrap();
        // frame, bytecode len, stack, param count
        let globals_size = u16::from_le_bytes([out[7], out[8]]);
        assert_eq!(globals_size, 1 + 2 + 1 + 2);
    }

    #[test]
    fn optimisation_word_is_optional() {
        let sections = ProcedureSections::default();
        let mut with = Vec::new();
        let mut without = Vec::new();
        encode_procedure(&mut with, &sections, true).unwrap();
        encode_procedure(&mut without, &sections, false).unwrap();
        assert_eq!(with.len(), without.len() + 2);
    }

    #[test]
    fn zero_control_offsets_are_rejected() {
        let strings = ProcedureSections {
            name: "S".into(),
            strings: vec![StringDeclaration {
                offset: 0,
                max_length: 10,
            }],
            ..ProcedureSections::default()
        };
        let mut out = Vec::new();
        assert_eq!(
            encode_procedure(&mut out, &strings, false),
            Err(WriteError::ZeroControlOffset {
                procedure: "S".into(),
                section: "string",
            })
        );
        assert!(out.is_empty());

        let arrays = ProcedureSections {
            name: "A".into(),
            arrays: vec![ArrayDeclaration {
                offset: 0,
                length: 3,
            }],
            ..ProcedureSections::default()
        };
        let err = ObjectFileWriter::new("T").procedure(arrays).finish();
        assert!(matches!(
            err,
            Err(WriteError::ZeroControlOffset { section: "array", .. })
        ));
    }

    #[test]
    fn control_entries_load_back() {
        let sections = ProcedureSections {
            name: "MAIN".into(),
            frame_size: 20,
            strings: vec![StringDeclaration {
                offset: 5,
                max_length: 10,
            }],
            arrays: vec![ArrayDeclaration {
                offset: 2,
                length: 3,
            }],
            bytecode: vec![0xC0],
            ..ProcedureSections::default()
        };
        let image = ObjectFileWriter::new("T").procedure(sections.clone()).finish().unwrap();
        let file = crate::load(&image).unwrap();
        assert_eq!(file.procedures[0].strings, sections.strings);
        assert_eq!(file.procedures[0].arrays, sections.arrays);
        assert_eq!(file.procedures[0].bytecode, vec![0xC0]);
    }
}
