//! Bounds-checked little-endian reads over an object file image.

use opo_common::ValueType;

use crate::error::LoadError;

/// A read position within a byte slice.
pub(crate) struct Cursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(bytes: &'a [u8], offset: usize) -> Self {
        Self { bytes, offset }
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    pub(crate) fn take(&mut self, needed: usize) -> Result<&'a [u8], LoadError> {
        let end = self
            .offset
            .checked_add(needed)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(LoadError::Truncated {
                offset: self.offset,
                needed,
            })?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, LoadError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, LoadError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, LoadError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a length-prefixed string (one length byte, then the bytes).
    pub(crate) fn read_qstr(&mut self) -> Result<String, LoadError> {
        let len = self.read_u8()? as usize;
        let bytes = self.take(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    pub(crate) fn read_value_type(&mut self) -> Result<ValueType, LoadError> {
        let offset = self.offset;
        let code = self.read_u8()?;
        ValueType::try_from(code).map_err(|_| LoadError::InvalidValueType { offset, code })
    }
}
