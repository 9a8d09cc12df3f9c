//! Static procedure descriptors and external-environment reference numbering.
//!
//! A procedure's bytecode refers to globals, parameters and called
//! procedures through 16-bit EE references. The numbers are not stored in
//! the object file; they follow from the order and name lengths of the
//! declaration sections, and [`Procedure::new`] reproduces the compiler's
//! numbering.

use std::collections::HashMap;

use serde::Serialize;

use crate::value_type::ValueType;

/// First EE reference handed out within a procedure.
pub const FIRST_EE_REFERENCE: u16 = 18;

/// A formal parameter. Parameters are kept in file order, which is the
/// reverse of declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Parameter {
    pub value_type: ValueType,
    pub ee: u16,
}

/// A global variable declared by this procedure and visible to callees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlobalDeclaration {
    pub name: String,
    pub value_type: ValueType,
    /// Offset of the variable inside the declaring procedure's frame.
    pub offset: u16,
    pub ee: u16,
}

/// A procedure this procedure calls by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalledProcedure {
    pub name: String,
    pub arg_count: u8,
    pub ee: u16,
}

/// A global used by this procedure but declared by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlobalReference {
    pub name: String,
    pub value_type: ValueType,
    pub ee: u16,
}

/// A string variable's capacity, seeded into the frame on activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StringDeclaration {
    /// Frame offset of the maximum-length byte (one before the variable).
    pub offset: u16,
    pub max_length: u8,
}

/// An array's element count, seeded into the frame on activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArrayDeclaration {
    /// Frame offset of the element-count word.
    pub offset: u16,
    pub length: u16,
}

/// Raw sections of a procedure body, as they appear in the file.
///
/// EE references are assigned when this is turned into a [`Procedure`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcedureSections {
    pub name: String,
    pub source_line: u16,
    pub bytecode_offset: u32,
    pub optimisation_section_size: Option<u16>,
    pub frame_size: u16,
    pub max_stack: u16,
    /// Parameter types in file order.
    pub parameter_types: Vec<ValueType>,
    /// `(name, type, frame offset)` per declared global.
    pub globals: Vec<(String, ValueType, u16)>,
    /// `(name, argument count)` per called procedure.
    pub called: Vec<(String, u8)>,
    /// `(name, type)` per imported global.
    pub global_references: Vec<(String, ValueType)>,
    pub strings: Vec<StringDeclaration>,
    pub arrays: Vec<ArrayDeclaration>,
    pub bytecode: Vec<u8>,
}

/// A loaded procedure: immutable once built, shared by every activation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Procedure {
    pub name: String,
    pub source_line: u16,
    pub bytecode_offset: u32,
    pub optimisation_section_size: Option<u16>,
    pub frame_size: u16,
    pub max_stack: u16,
    pub parameters: Vec<Parameter>,
    pub globals: Vec<GlobalDeclaration>,
    pub called: Vec<CalledProcedure>,
    pub global_references: Vec<GlobalReference>,
    pub strings: Vec<StringDeclaration>,
    pub arrays: Vec<ArrayDeclaration>,
    #[serde(skip)]
    pub bytecode: Vec<u8>,
    /// One past the highest EE reference assigned.
    pub max_ee_ref: u16,
    #[serde(skip)]
    globals_by_ee: HashMap<u16, usize>,
    #[serde(skip)]
    called_by_ee: HashMap<u16, usize>,
    #[serde(skip)]
    references_by_ee: HashMap<u16, usize>,
    #[serde(skip)]
    parameters_by_ee: HashMap<u16, usize>,
}

impl Procedure {
    /// Builds a procedure from its raw sections, numbering EE references.
    ///
    /// Numbering starts at 18. Each global advances the counter by its
    /// name length plus 4 and each called procedure by its name length
    /// plus 2. Parameters follow, numbered from the last file-order entry
    /// to the first, then imported globals; both advance by 2.
    pub fn new(sections: ProcedureSections) -> Procedure {
        let mut counter = FIRST_EE_REFERENCE;

        let globals: Vec<GlobalDeclaration> = sections
            .globals
            .into_iter()
            .map(|(name, value_type, offset)| {
                let ee = counter;
                counter = counter.wrapping_add(name.len() as u16 + 4);
                GlobalDeclaration {
                    name,
                    value_type,
                    offset,
                    ee,
                }
            })
            .collect();

        let called: Vec<CalledProcedure> = sections
            .called
            .into_iter()
            .map(|(name, arg_count)| {
                let ee = counter;
                counter = counter.wrapping_add(name.len() as u16 + 2);
                CalledProcedure {
                    name,
                    arg_count,
                    ee,
                }
            })
            .collect();

        let mut parameters: Vec<Parameter> = sections
            .parameter_types
            .into_iter()
            .map(|value_type| Parameter { value_type, ee: 0 })
            .collect();
        for parameter in parameters.iter_mut().rev() {
            parameter.ee = counter;
            counter = counter.wrapping_add(2);
        }

        let global_references: Vec<GlobalReference> = sections
            .global_references
            .into_iter()
            .map(|(name, value_type)| {
                let ee = counter;
                counter = counter.wrapping_add(2);
                GlobalReference {
                    name,
                    value_type,
                    ee,
                }
            })
            .collect();

        let globals_by_ee = globals.iter().enumerate().map(|(i, g)| (g.ee, i)).collect();
        let called_by_ee = called.iter().enumerate().map(|(i, c)| (c.ee, i)).collect();
        let references_by_ee = global_references
            .iter()
            .enumerate()
            .map(|(i, r)| (r.ee, i))
            .collect();
        let parameters_by_ee = parameters
            .iter()
            .enumerate()
            .map(|(i, p)| (p.ee, i))
            .collect();

        Procedure {
            name: sections.name,
            source_line: sections.source_line,
            bytecode_offset: sections.bytecode_offset,
            optimisation_section_size: sections.optimisation_section_size,
            frame_size: sections.frame_size,
            max_stack: sections.max_stack,
            parameters,
            globals,
            called,
            global_references,
            strings: sections.strings,
            arrays: sections.arrays,
            bytecode: sections.bytecode,
            max_ee_ref: counter,
            globals_by_ee,
            called_by_ee,
            references_by_ee,
            parameters_by_ee,
        }
    }

    /// Recovers the raw sections this procedure was built from.
    pub fn sections(&self) -> ProcedureSections {
        ProcedureSections {
            name: self.name.clone(),
            source_line: self.source_line,
            bytecode_offset: self.bytecode_offset,
            optimisation_section_size: self.optimisation_section_size,
            frame_size: self.frame_size,
            max_stack: self.max_stack,
            parameter_types: self.parameters.iter().map(|p| p.value_type).collect(),
            globals: self
                .globals
                .iter()
                .map(|g| (g.name.clone(), g.value_type, g.offset))
                .collect(),
            called: self
                .called
                .iter()
                .map(|c| (c.name.clone(), c.arg_count))
                .collect(),
            global_references: self
                .global_references
                .iter()
                .map(|r| (r.name.clone(), r.value_type))
                .collect(),
            strings: self.strings.clone(),
            arrays: self.arrays.clone(),
            bytecode: self.bytecode.clone(),
        }
    }

    pub fn global_by_ee(&self, ee: u16) -> Option<&GlobalDeclaration> {
        self.globals_by_ee.get(&ee).map(|&i| &self.globals[i])
    }

    pub fn called_by_ee(&self, ee: u16) -> Option<&CalledProcedure> {
        self.called_by_ee.get(&ee).map(|&i| &self.called[i])
    }

    pub fn global_reference_by_ee(&self, ee: u16) -> Option<&GlobalReference> {
        self.references_by_ee.get(&ee).map(|&i| &self.global_references[i])
    }

    /// Index into [`Procedure::parameters`] of the parameter numbered `ee`.
    pub fn parameter_index_by_ee(&self, ee: u16) -> Option<usize> {
        self.parameters_by_ee.get(&ee).copied()
    }

    /// Looks up a global this procedure declares, by exact name.
    pub fn global_named(&self, name: &str) -> Option<&GlobalDeclaration> {
        self.globals.iter().find(|g| g.name == name)
    }

    /// The string declaration whose maximum-length byte sits at `offset`.
    pub fn string_declaration_at(&self, offset: u16) -> Option<&StringDeclaration> {
        self.strings.iter().find(|s| s.offset == offset)
    }

    /// The array declaration whose element-count word sits at `offset`.
    pub fn array_declaration_at(&self, offset: u16) -> Option<&ArrayDeclaration> {
        self.arrays.iter().find(|a| a.offset == offset)
    }

    /// Result type implied by the procedure name's suffix.
    pub fn result_type(&self) -> ValueType {
        match self.name.chars().last() {
            Some('%') => ValueType::Word,
            Some('&') => ValueType::Long,
            Some('$') => ValueType::Str,
            _ => ValueType::Float,
        }
    }
}
