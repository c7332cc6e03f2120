//! Data section writer with pointer compression
//!
//! Built fresh for every serialization. Record-level values are written once
//! per content key and referenced by offset from node records. Inside maps
//! and arrays, a value (or map key) that was already written is replaced by
//! a pointer when the pointer is strictly shorter than the bytes the value
//! took the first time.

use crate::data_section::{
    pointer_len, sorted_entries, string_content_key, write_pointer, write_string, ContentKey,
    DataValue,
};
use crate::error::{Result, WriterError};
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy)]
struct Written {
    offset: u32,
    size: usize,
}

/// Serializer for a data section (or the metadata map)
#[derive(Debug, Default)]
pub struct DataWriter {
    buffer: Vec<u8>,
    written: FxHashMap<ContentKey, Written>,
    use_pointers: bool,
}

impl DataWriter {
    /// Create a writer; `use_pointers` enables pointer substitution
    pub fn new(use_pointers: bool) -> Self {
        Self {
            buffer: Vec::new(),
            written: FxHashMap::default(),
            use_pointers,
        }
    }

    /// Write a value referenced from a node record, returning its offset
    ///
    /// A key that was already written at the top level returns the original
    /// offset without writing anything.
    pub fn write_record_value(&mut self, key: ContentKey, value: &DataValue) -> Result<u32> {
        if let Some(written) = self.written.get(&key) {
            return Ok(written.offset);
        }
        let offset = self.next_offset()?;
        self.write_body(value)?;
        let size = self.buffer.len() - offset as usize;
        self.written.insert(key, Written { offset, size });
        Ok(offset)
    }

    /// Write a nested value, or a pointer to an earlier copy when shorter
    pub fn write_or_point(&mut self, value: &DataValue) -> Result<()> {
        let key = value.content_key()?;
        if self.try_point(key) {
            return Ok(());
        }
        let offset = self.next_offset()?;
        self.write_body(value)?;
        self.remember(key, offset);
        Ok(())
    }

    /// Write a map key, or a pointer to an earlier copy when shorter
    pub fn write_key(&mut self, key: &str) -> Result<()> {
        let content_key = string_content_key(key)?;
        if self.try_point(content_key) {
            return Ok(());
        }
        let offset = self.next_offset()?;
        write_string(key, &mut self.buffer)?;
        self.remember(content_key, offset);
        Ok(())
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True when nothing has been written
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Finished section bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    fn write_body(&mut self, value: &DataValue) -> Result<()> {
        value.write_head(&mut self.buffer)?;
        match value {
            DataValue::Map(map) => {
                for (key, item) in sorted_entries(map) {
                    self.write_key(key)?;
                    self.write_or_point(item)?;
                }
            }
            DataValue::Array(items) => {
                for item in items {
                    self.write_or_point(item)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn try_point(&mut self, key: ContentKey) -> bool {
        if !self.use_pointers {
            return false;
        }
        match self.written.get(&key) {
            Some(w) if w.size > pointer_len(w.offset) => {
                write_pointer(w.offset, &mut self.buffer);
                true
            }
            _ => false,
        }
    }

    fn remember(&mut self, key: ContentKey, offset: u32) {
        let size = self.buffer.len() - offset as usize;
        self.written.entry(key).or_insert(Written { offset, size });
    }

    fn next_offset(&self) -> Result<u32> {
        u32::try_from(self.buffer.len()).map_err(|_| {
            WriterError::encoding_limit(format!(
                "data section of {} bytes exceeds 32-bit pointer addressing",
                self.buffer.len()
            ))
        })
    }
}
