//! Value type codes shared by declarations, parameters and the operand stack.

use serde::Serialize;

use crate::error::DecodeError;

/// The five value kinds an OPL program manipulates.
///
/// The discriminant is the type code stored in object files and pushed
/// alongside call arguments.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ValueType {
    /// 16-bit signed integer (`%`).
    Word = 0,
    /// 32-bit signed integer (`&`).
    Long = 1,
    /// IEEE 754 64-bit float.
    Float = 2,
    /// Length-prefixed string (`$`), at most 255 bytes.
    Str = 3,
    /// 16-bit address into the frame heap.
    Addr = 4,
}

/// All value types, in code order.
pub const ALL_VALUE_TYPES: [ValueType; 5] = [
    ValueType::Word,
    ValueType::Long,
    ValueType::Float,
    ValueType::Str,
    ValueType::Addr,
];

impl TryFrom<u8> for ValueType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ValueType::Word),
            1 => Ok(ValueType::Long),
            2 => Ok(ValueType::Float),
            3 => Ok(ValueType::Str),
            4 => Ok(ValueType::Addr),
            _ => Err(DecodeError::InvalidValueType(value)),
        }
    }
}

impl ValueType {
    /// Selects the type from the low two bits of a type-family opcode.
    ///
    /// Opcodes come in runs of four (Word, Long, Float, String), so
    /// `opcode - base` is always in `0..4` for a well-formed dispatch.
    pub fn from_family_offset(offset: u8) -> ValueType {
        match offset & 0x03 {
            0 => ValueType::Word,
            1 => ValueType::Long,
            2 => ValueType::Float,
            _ => ValueType::Str,
        }
    }

    /// Size in bytes of one stored element. Strings report their length
    /// byte only; the full slot size depends on the declared maximum.
    pub fn size(&self) -> usize {
        match self {
            ValueType::Word | ValueType::Addr => 2,
            ValueType::Long => 4,
            ValueType::Float => 8,
            ValueType::Str => 1,
        }
    }

    /// Source-language suffix used in variable and procedure names.
    pub fn suffix(&self) -> &'static str {
        match self {
            ValueType::Word => "%",
            ValueType::Long => "&",
            ValueType::Float => "",
            ValueType::Str => "$",
            ValueType::Addr => "@",
        }
    }

    /// Returns true for Word, Long and Float.
    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueType::Word | ValueType::Long | ValueType::Float)
    }
}
