//! Constant pool
//!
//! Deduplicated table of the source IDs and data-type names a file refers
//! to. Samples store 16-bit indices into it instead of the strings.

use std::collections::HashMap;

use super::{put_string, put_u32, ByteReader, MAX_POOL_ENTRIES};
use crate::error::{RecordingError, Result};
use crate::recording::Sample;

/// Order-stable, deduplicated string table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstantPool {
    entries: Vec<String>,
    indices: HashMap<String, u16>,
}

impl ConstantPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the pool for a sequence of samples
    ///
    /// Strings appear in order of first use, each sample contributing its
    /// source ID before its data type.
    pub fn from_samples<'a>(samples: impl IntoIterator<Item = &'a Sample>) -> Result<Self> {
        let mut pool = Self::new();
        for sample in samples {
            pool.intern(sample.source_id())?;
            pool.intern(sample.data_type())?;
        }
        Ok(pool)
    }

    /// Get the index of a string, adding it to the end of the pool if needed
    pub fn intern(&mut self, value: &str) -> Result<u16> {
        if let Some(index) = self.indices.get(value) {
            return Ok(*index);
        }
        if self.entries.len() >= MAX_POOL_ENTRIES {
            return Err(RecordingError::PoolOverflow {
                count: self.entries.len() + 1,
                max: MAX_POOL_ENTRIES,
            });
        }
        let index = self.entries.len() as u16;
        self.entries.push(value.to_string());
        self.indices.insert(value.to_string(), index);
        Ok(index)
    }

    /// Index of a string already in the pool
    pub fn index_of(&self, value: &str) -> Option<u16> {
        self.indices.get(value).copied()
    }

    /// Resolve an index to its string
    pub fn get(&self, index: u16) -> Result<&str> {
        self.entries
            .get(index as usize)
            .map(String::as_str)
            .ok_or(RecordingError::PoolIndexOutOfRange {
                index,
                len: self.entries.len(),
            })
    }

    /// All entries in index order
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the pool is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode the whole pool: entry count followed by every entry
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_u32(&mut out, self.entries.len() as u32);
        out.extend_from_slice(&self.encode_entries(0));
        out
    }

    /// Encode the entries starting at index `from`, without a count
    pub fn encode_entries(&self, from: usize) -> Vec<u8> {
        let mut out = Vec::new();
        for entry in self.entries.iter().skip(from) {
            put_string(&mut out, entry);
        }
        out
    }

    /// Decode a pool that must occupy exactly `bytes`
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes, 0);
        let count = reader.read_u32("constant pool size")? as usize;
        if count > MAX_POOL_ENTRIES {
            return Err(RecordingError::PoolOverflow {
                count,
                max: MAX_POOL_ENTRIES,
            });
        }
        let mut pool = Self::new();
        for _ in 0..count {
            let entry = reader.read_string("constant pool entry")?;
            if pool.indices.contains_key(&entry) {
                return Err(RecordingError::malformed(format!(
                    "duplicate constant pool entry '{}'",
                    entry
                )));
            }
            pool.intern(&entry)?;
        }
        if reader.position() != bytes.len() {
            return Err(RecordingError::malformed(format!(
                "constant pool ends at {} but markers start at {}",
                reader.position(),
                bytes.len()
            )));
        }
        Ok(pool)
    }
}
