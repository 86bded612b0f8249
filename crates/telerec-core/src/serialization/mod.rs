//! Recording file format
//!
//! Binary layout of a recording file (all integers big-endian):
//!
//! ```text
//! offset  size  field
//! 0       4     magic number 0xFEEDBAC4
//! 4       4     format version
//! 8       4     number of data points
//! 12      4     offset of the markers section
//! 16      4     offset of the data section
//! 20      ..    constant pool: count, then (length, UTF-8 bytes) per entry
//! ..      ..    markers: count, then (timestamp i64, name, description, importance u8)
//! ..      ..    data: (timestamp i64, source index u16, type index u16, payload)...
//! ```
//!
//! The data section is always last, so new samples are a pure append. New
//! constant pool entries and markers are spliced into the middle of the file
//! (see [`insert_bytes`]) and the header offsets are patched in place.

mod guard;
mod pool;
mod reader;
mod splice;
mod update;
mod writer;

pub use pool::ConstantPool;
pub use reader::{decode_recording, inspect_recording, load_recording, FileInfo};
pub use splice::insert_bytes;
pub use update::{append_recording, update_recording};
pub use writer::{encode_recording, save_recording, write_recording};

use byteorder::{BigEndian, ByteOrder};

use crate::error::{RecordingError, Result};
use crate::recording::Marker;

/// Magic number identifying a recording file
pub const MAGIC_NUMBER: u32 = 0xFEED_BAC4;

/// Current format version; files with any other version are rejected
pub const FORMAT_VERSION: u32 = 2;

/// Size of the fixed header in bytes
pub const HEADER_SIZE: usize = 20;

/// Maximum number of constant pool entries (indices are signed 16-bit on the wire)
pub const MAX_POOL_ENTRIES: usize = i16::MAX as usize;

pub(crate) const SIZE_OF_BYTE: usize = 1;
pub(crate) const SIZE_OF_SHORT: usize = 2;
pub(crate) const SIZE_OF_INT: usize = 4;
pub(crate) const SIZE_OF_LONG: usize = 8;

/// Position of the constant pool entry count
pub(crate) const POOL_OFFSET: u64 = HEADER_SIZE as u64;

/// Summary of a save or update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// Samples written by this operation
    pub samples: usize,
    /// Markers written by this operation
    pub markers: usize,
    /// New constant pool entries written by this operation
    pub pool_entries: usize,
    /// Bytes added to the file
    pub bytes: u64,
    /// Whether the whole file was (re)written rather than extended
    pub full_save: bool,
}

/// Fixed-size file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Format version
    pub version: u32,
    /// Number of data points in the data section
    pub data_count: u32,
    /// Offset of the markers section from the start of the file
    pub markers_offset: u32,
    /// Offset of the data section from the start of the file
    pub data_offset: u32,
}

impl Header {
    /// Encode the header, including the magic number
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        BigEndian::write_u32(&mut bytes[0..4], MAGIC_NUMBER);
        BigEndian::write_u32(&mut bytes[4..8], self.version);
        BigEndian::write_u32(&mut bytes[8..12], self.data_count);
        BigEndian::write_u32(&mut bytes[12..16], self.markers_offset);
        BigEndian::write_u32(&mut bytes[16..20], self.data_offset);
        bytes
    }

    /// Decode and validate a header from the start of `bytes`
    ///
    /// The magic number is checked first, then the version, then the size.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < SIZE_OF_INT {
            return Err(RecordingError::malformed(format!(
                "file too small for a header ({} bytes)",
                bytes.len()
            )));
        }
        let magic = BigEndian::read_u32(&bytes[0..4]);
        if magic != MAGIC_NUMBER {
            return Err(RecordingError::InvalidMagic {
                expected: MAGIC_NUMBER,
                actual: magic,
            });
        }
        if bytes.len() < HEADER_SIZE {
            return Err(RecordingError::malformed(format!(
                "file too small for a header ({} bytes)",
                bytes.len()
            )));
        }
        let version = BigEndian::read_u32(&bytes[4..8]);
        if version != FORMAT_VERSION {
            return Err(RecordingError::UnsupportedVersion {
                expected: FORMAT_VERSION,
                actual: version,
            });
        }
        let header = Self {
            version,
            data_count: BigEndian::read_u32(&bytes[8..12]),
            markers_offset: BigEndian::read_u32(&bytes[12..16]),
            data_offset: BigEndian::read_u32(&bytes[16..20]),
        };
        if (header.markers_offset as usize) < HEADER_SIZE + SIZE_OF_INT
            || header
                .markers_offset
                .checked_add(SIZE_OF_INT as u32)
                .map_or(true, |min| header.data_offset < min)
        {
            return Err(RecordingError::malformed(format!(
                "inconsistent section offsets (markers at {}, data at {})",
                header.markers_offset, header.data_offset
            )));
        }
        Ok(header)
    }
}

/// Convert a file position to a 32-bit header field
pub(crate) fn to_offset(position: u64) -> Result<u32> {
    u32::try_from(position).map_err(|_| RecordingError::FileTooLarge(position))
}

pub(crate) fn put_u16(out: &mut Vec<u8>, value: u16) {
    let mut bytes = [0u8; SIZE_OF_SHORT];
    BigEndian::write_u16(&mut bytes, value);
    out.extend_from_slice(&bytes);
}

pub(crate) fn put_u32(out: &mut Vec<u8>, value: u32) {
    let mut bytes = [0u8; SIZE_OF_INT];
    BigEndian::write_u32(&mut bytes, value);
    out.extend_from_slice(&bytes);
}

pub(crate) fn put_i64(out: &mut Vec<u8>, value: i64) {
    let mut bytes = [0u8; SIZE_OF_LONG];
    BigEndian::write_i64(&mut bytes, value);
    out.extend_from_slice(&bytes);
}

pub(crate) fn put_string(out: &mut Vec<u8>, value: &str) {
    put_u32(out, value.len() as u32);
    out.extend_from_slice(value.as_bytes());
}

/// Encode markers without the leading count
pub(crate) fn encode_marker_entries(markers: &[Marker]) -> Vec<u8> {
    let mut out = Vec::new();
    for marker in markers {
        put_i64(&mut out, marker.timestamp());
        put_string(&mut out, marker.name());
        put_string(&mut out, marker.description());
        out.push(marker.importance().tag());
    }
    out
}

/// Bounds-checked big-endian reader over a byte slice
pub(crate) struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn buffer(&self) -> &'a [u8] {
        self.buf
    }

    pub(crate) fn skip(&mut self, len: usize, what: &str) -> Result<()> {
        self.take(len, what).map(|_| ())
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| {
                RecordingError::malformed(format!(
                    "unexpected end of file reading {} at offset {}",
                    what, self.pos
                ))
            })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn read_u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(SIZE_OF_BYTE, what)?[0])
    }

    pub(crate) fn read_u16(&mut self, what: &str) -> Result<u16> {
        Ok(BigEndian::read_u16(self.take(SIZE_OF_SHORT, what)?))
    }

    pub(crate) fn read_u32(&mut self, what: &str) -> Result<u32> {
        Ok(BigEndian::read_u32(self.take(SIZE_OF_INT, what)?))
    }

    pub(crate) fn read_i64(&mut self, what: &str) -> Result<i64> {
        Ok(BigEndian::read_i64(self.take(SIZE_OF_LONG, what)?))
    }

    pub(crate) fn read_string(&mut self, what: &str) -> Result<String> {
        let len = self.read_u32(what)? as usize;
        let bytes = self.take(len, what)?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| RecordingError::malformed(format!("{} is not valid UTF-8", what)))
    }
}
