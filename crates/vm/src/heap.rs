//! The frame heap: a flat byte arena holding procedure frames and ALLOC
//! blocks.
//!
//! Allocation is first-fit over a list of free ranges. Freed ranges are
//! appended to the list and never merged with their neighbours.

use std::ops::Range;

use opo_common::{Value, ValueType};
use tracing::debug;

use crate::error::RuntimeError;

#[derive(Debug, Clone)]
pub struct FrameHeap {
    memory: Vec<u8>,
    free: Vec<Range<usize>>,
    allocated: Vec<Range<usize>>,
}

impl FrameHeap {
    pub fn new(size: usize) -> Self {
        Self {
            memory: vec![0; size],
            free: vec![0..size],
            allocated: Vec::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.memory.len()
    }

    /// Reserves `size` zeroed bytes from the first free range large enough
    /// and returns their offset.
    pub fn allocate(&mut self, size: usize) -> Result<usize, RuntimeError> {
        let index = self
            .free
            .iter()
            .position(|r| r.len() >= size)
            .ok_or(RuntimeError::OutOfMemory { requested: size })?;

        let start = self.free[index].start;
        if self.free[index].len() == size {
            self.free.remove(index);
        } else {
            self.free[index].start += size;
        }

        self.memory[start..start + size].fill(0);
        self.allocated.push(start..start + size);
        debug!(offset = start, size, "heap allocate");
        Ok(start)
    }

    /// Releases the allocated range starting at, or containing, `offset`.
    /// Offsets that belong to no allocation are ignored.
    pub fn free(&mut self, offset: usize) {
        let index = self
            .allocated
            .iter()
            .position(|r| r.start == offset)
            .or_else(|| self.allocated.iter().position(|r| r.contains(&offset)));
        if let Some(index) = index {
            let range = self.allocated.remove(index);
            debug!(offset = range.start, size = range.len(), "heap free");
            if !range.is_empty() {
                self.free.push(range);
            }
        }
    }

    pub fn free_ranges(&self) -> &[Range<usize>] {
        &self.free
    }

    pub fn allocations(&self) -> &[Range<usize>] {
        &self.allocated
    }

    fn span(&self, address: usize, len: usize) -> Result<Range<usize>, RuntimeError> {
        address
            .checked_add(len)
            .filter(|&end| end <= self.memory.len())
            .map(|end| address..end)
            .ok_or(RuntimeError::AddressOutOfRange {
                address,
                size: self.memory.len(),
            })
    }

    pub fn bytes(&self, address: usize, len: usize) -> Result<&[u8], RuntimeError> {
        let span = self.span(address, len)?;
        Ok(&self.memory[span])
    }

    pub fn read_byte(&self, address: usize) -> Result<u8, RuntimeError> {
        Ok(self.bytes(address, 1)?[0])
    }

    pub fn write_byte(&mut self, address: usize, byte: u8) -> Result<(), RuntimeError> {
        self.write_bytes(address, &[byte])
    }

    pub fn write_bytes(&mut self, address: usize, bytes: &[u8]) -> Result<(), RuntimeError> {
        let span = self.span(address, bytes.len())?;
        self.memory[span].copy_from_slice(bytes);
        Ok(())
    }

    /// Reads a value of type `ty` stored at `address`.
    ///
    /// Strings are stored as a length byte followed by their bytes; the
    /// address is that of the length byte.
    pub fn read(&self, ty: ValueType, address: usize) -> Result<Value, RuntimeError> {
        Ok(match ty {
            ValueType::Word => {
                let b = self.bytes(address, 2)?;
                Value::Word(i16::from_le_bytes([b[0], b[1]]))
            }
            ValueType::Long => {
                let b = self.bytes(address, 4)?;
                Value::Long(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            }
            ValueType::Float => {
                let b = self.bytes(address, 8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(b);
                Value::Float(f64::from_le_bytes(raw))
            }
            ValueType::Str => {
                let len = self.read_byte(address)? as usize;
                let b = self.bytes(address + 1, len)?;
                Value::Str(String::from_utf8_lossy(b).into_owned())
            }
            ValueType::Addr => {
                let b = self.bytes(address, 2)?;
                Value::Addr(u16::from_le_bytes([b[0], b[1]]))
            }
        })
    }

    /// Writes `value` at `address` in its stored layout. Strings get a
    /// fresh length byte; the declared maximum is not consulted.
    pub fn write(&mut self, value: &Value, address: usize) -> Result<(), RuntimeError> {
        match value {
            Value::Word(v) => self.write_bytes(address, &v.to_le_bytes()),
            Value::Long(v) => self.write_bytes(address, &v.to_le_bytes()),
            Value::Float(v) => self.write_bytes(address, &v.to_le_bytes()),
            Value::Addr(v) => self.write_bytes(address, &v.to_le_bytes()),
            Value::Str(s) => {
                let len = u8::try_from(s.len())
                    .map_err(|_| RuntimeError::StringTooLong { len: s.len() })?;
                self.span(address, 1 + s.len())?;
                self.write_byte(address, len)?;
                self.write_bytes(address + 1, s.as_bytes())
            }
        }
    }

    /// Address of element `index` (1-based) of an array starting at `base`.
    /// String elements occupy `capacity + 1` bytes each.
    pub fn element_address(
        ty: ValueType,
        base: usize,
        index: i32,
        capacity: u8,
    ) -> Result<usize, RuntimeError> {
        if index < 1 {
            return Err(RuntimeError::ArrayIndexOutOfBounds { index });
        }
        let stride = match ty {
            ValueType::Str => capacity as usize + 1,
            other => other.size(),
        };
        Ok(base + stride * (index as usize - 1))
    }
}
