//! The typed operand stack shared by all activations.

use opo_common::{Value, ValueType};

use crate::error::RuntimeError;

/// LIFO of typed values. Arguments, results and temporaries all live here;
/// there is one stack per executable, not per activation.
#[derive(Debug, Default, Clone)]
pub struct OperandStack {
    entries: Vec<Value>,
}

impl OperandStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: Value) {
        self.entries.push(value);
    }

    pub fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.entries.pop().ok_or(RuntimeError::StackUnderflow)
    }

    /// Pops two entries, returning them in push order: `(second, top)`.
    pub fn pop2(&mut self) -> Result<(Value, Value), RuntimeError> {
        let top = self.pop()?;
        let second = self.pop()?;
        Ok((second, top))
    }

    /// Pops `n` entries, returning them in push order.
    pub fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, RuntimeError> {
        if self.entries.len() < n {
            return Err(RuntimeError::StackUnderflow);
        }
        Ok(self.entries.split_off(self.entries.len() - n))
    }

    pub fn peek(&self) -> Option<&Value> {
        self.entries.last()
    }

    /// Entry `depth` places below the top; 0 is the top.
    pub fn peek_at(&self, depth: usize) -> Option<&Value> {
        self.entries.iter().rev().nth(depth)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Pops an integer (Word, Long or Address) widened to i32.
    pub(crate) fn pop_int(&mut self) -> Result<i32, RuntimeError> {
        let value = self.pop()?;
        value.as_i32().ok_or(RuntimeError::TypeMismatch {
            expected: ValueType::Long,
            found: value.value_type(),
        })
    }

    /// Pops a Word. Longs are accepted when they fit.
    pub(crate) fn pop_word(&mut self) -> Result<i16, RuntimeError> {
        let value = self.pop()?;
        match value {
            Value::Word(w) => Ok(w),
            Value::Addr(a) => Ok(a as i16),
            Value::Long(l) => i16::try_from(l).map_err(|_| RuntimeError::Overflow),
            other => Err(RuntimeError::TypeMismatch {
                expected: ValueType::Word,
                found: other.value_type(),
            }),
        }
    }

    pub(crate) fn pop_float(&mut self) -> Result<f64, RuntimeError> {
        let value = self.pop()?;
        value.as_f64().ok_or(RuntimeError::TypeMismatch {
            expected: ValueType::Float,
            found: value.value_type(),
        })
    }

    pub(crate) fn pop_string(&mut self) -> Result<String, RuntimeError> {
        match self.pop()? {
            Value::Str(s) => Ok(s),
            other => Err(RuntimeError::TypeMismatch {
                expected: ValueType::Str,
                found: other.value_type(),
            }),
        }
    }

    pub(crate) fn pop_address(&mut self) -> Result<usize, RuntimeError> {
        let value = self.pop()?;
        value
            .as_address()
            .map(usize::from)
            .ok_or(RuntimeError::TypeMismatch {
                expected: ValueType::Addr,
                found: value.value_type(),
            })
    }
}
