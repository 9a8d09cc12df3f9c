//! Runtime values held on the operand stack and in procedure parameters.

use std::fmt;

use serde::Serialize;

use crate::value_type::ValueType;

/// A typed runtime value.
///
/// Every operand stack entry is one of these; the variant is the entry's
/// type tag.
#[derive(Debug, Clone, Serialize)]
pub enum Value {
    Word(i16),
    Long(i32),
    Float(f64),
    Str(String),
    Addr(u16),
}

// Floats compare bitwise so that values can be matched exactly in tests
// and used as cache keys; arithmetic comparisons go through `as_f64`.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Word(a), Value::Word(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Addr(a), Value::Addr(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Value {
    /// Returns the type of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Word(_) => ValueType::Word,
            Value::Long(_) => ValueType::Long,
            Value::Float(_) => ValueType::Float,
            Value::Str(_) => ValueType::Str,
            Value::Addr(_) => ValueType::Addr,
        }
    }

    /// The default value of a type, as pushed by a bare RETURN.
    pub fn zero(ty: ValueType) -> Value {
        match ty {
            ValueType::Word => Value::Word(0),
            ValueType::Long => Value::Long(0),
            ValueType::Float => Value::Float(0.0),
            ValueType::Str => Value::Str(String::new()),
            ValueType::Addr => Value::Addr(0),
        }
    }

    /// Integer view of Word, Long and Addr values.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Word(v) => Some(i32::from(*v)),
            Value::Long(v) => Some(*v),
            Value::Addr(v) => Some(i32::from(*v)),
            _ => None,
        }
    }

    /// Float view of any numeric value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            other => other.as_i32().map(f64::from),
        }
    }

    /// Interprets the value as a heap address.
    ///
    /// Addresses travel as Words in compiled code, so negative Words are
    /// reinterpreted as their unsigned bit pattern.
    pub fn as_address(&self) -> Option<u16> {
        match self {
            Value::Addr(a) => Some(*a),
            Value::Word(w) => Some(*w as u16),
            Value::Long(l) => u16::try_from(*l).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Truth value as used by conditional branches: zero and the empty
    /// string are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Word(v) => *v != 0,
            Value::Long(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Addr(v) => *v != 0,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Word(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => f.write_str(s),
            Value::Addr(v) => write!(f, "{v}"),
        }
    }
}
