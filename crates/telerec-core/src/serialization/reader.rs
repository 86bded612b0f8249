//! Loading recordings
//!
//! Any structural problem aborts the load; nothing is recovered from a
//! partially valid file.

use std::fs;
use std::path::Path;

use super::{ByteReader, ConstantPool, Header, HEADER_SIZE, SIZE_OF_INT};
use crate::codec::CodecRegistry;
use crate::error::{RecordingError, Result};
use crate::recording::{Marker, MarkerImportance, Recording, Sample};

/// Structural summary of a recording file, without decoding any payloads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// The file header
    pub header: Header,
    /// Constant pool entries in index order
    pub pool: Vec<String>,
    /// Markers stored in the file
    pub markers: Vec<Marker>,
    /// Total file size in bytes
    pub file_len: u64,
}

struct Sections<'a> {
    header: Header,
    pool: ConstantPool,
    markers: Vec<Marker>,
    data: ByteReader<'a>,
}

fn read_sections(bytes: &[u8]) -> Result<Sections<'_>> {
    let header = Header::decode(bytes)?;
    let markers_offset = header.markers_offset as usize;
    let data_offset = header.data_offset as usize;
    if data_offset > bytes.len() {
        return Err(RecordingError::malformed(format!(
            "data section starts at {} but the file is only {} bytes",
            data_offset,
            bytes.len()
        )));
    }

    let pool = ConstantPool::decode(&bytes[HEADER_SIZE..markers_offset])?;

    let mut reader = ByteReader::new(bytes, markers_offset);
    let count = reader.read_u32("marker count")? as usize;
    let mut markers = Vec::with_capacity(count.min(bytes.len() / SIZE_OF_INT));
    for _ in 0..count {
        let timestamp = reader.read_i64("marker timestamp")?;
        let name = reader.read_string("marker name")?;
        let description = reader.read_string("marker description")?;
        let tag = reader.read_u8("marker importance")?;
        let importance = MarkerImportance::from_tag(tag).ok_or_else(|| {
            RecordingError::malformed(format!("unknown marker importance tag {}", tag))
        })?;
        markers.push(Marker::new(name, description, importance, timestamp));
    }
    if reader.position() != data_offset {
        return Err(RecordingError::malformed(format!(
            "markers section ends at {} but data starts at {}",
            reader.position(),
            data_offset
        )));
    }

    Ok(Sections {
        header,
        pool,
        markers,
        data: ByteReader::new(bytes, data_offset),
    })
}

/// Decode a recording from the bytes of a whole file
///
/// Samples come back in `(timestamp, source_id)` order.
pub fn decode_recording(bytes: &[u8], codecs: &CodecRegistry) -> Result<Recording> {
    let Sections {
        header,
        pool,
        markers,
        data: mut reader,
    } = read_sections(bytes)?;

    let mut recording = Recording::from_parts(Vec::new(), markers);
    for _ in 0..header.data_count {
        let timestamp = reader.read_i64("sample timestamp")?;
        let source_id = pool.get(reader.read_u16("source index")?)?;
        let data_type = pool.get(reader.read_u16("data type index")?)?;

        let (value, size) = codecs.decode(data_type, reader.buffer(), reader.position())?;
        reader.skip(size, "sample payload")?;
        recording.append(Sample::new(source_id, data_type, value, timestamp));
    }
    if reader.position() != bytes.len() {
        return Err(RecordingError::malformed(format!(
            "{} unexpected trailing bytes after {} data points",
            bytes.len() - reader.position(),
            header.data_count
        )));
    }

    recording.sort();
    Ok(recording)
}

/// Load the recording stored at `path`
pub fn load_recording(path: impl AsRef<Path>, codecs: &CodecRegistry) -> Result<Recording> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    let recording = decode_recording(&bytes, codecs)?;
    tracing::debug!(
        "Loaded {} samples and {} markers from {}",
        recording.len(),
        recording.markers().len(),
        path.display()
    );
    Ok(recording)
}

/// Read the header, constant pool and markers of the file at `path`
pub fn inspect_recording(path: impl AsRef<Path>) -> Result<FileInfo> {
    let bytes = fs::read(path)?;
    let sections = read_sections(&bytes)?;
    Ok(FileInfo {
        header: sections.header,
        pool: sections.pool.entries().to_vec(),
        markers: sections.markers,
        file_len: bytes.len() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Value;
    use crate::serialization::encode_recording;

    fn sample_bytes() -> Vec<u8> {
        let recording = Recording::from_parts(
            vec![
                Sample::of("/b", Value::Number(2.0), 20),
                Sample::of("/a", Value::from("x"), 20),
                Sample::of("/a", Value::Number(1.0), 10),
            ],
            vec![Marker::new("start", "", MarkerImportance::Normal, 0)],
        );
        encode_recording(&recording, &CodecRegistry::default()).unwrap()
    }

    #[test]
    fn test_decode_sorted() {
        let recording = decode_recording(&sample_bytes(), &CodecRegistry::default()).unwrap();
        let order: Vec<(i64, &str)> = recording
            .samples()
            .iter()
            .map(|s| (s.timestamp(), s.source_id()))
            .collect();
        assert_eq!(order, vec![(10, "/a"), (20, "/a"), (20, "/b")]);
        assert_eq!(recording.samples()[1].data_type(), "String");
    }

    #[test]
    fn test_truncated_file_rejected() {
        let mut bytes = sample_bytes();
        bytes.pop();
        let err = decode_recording(&bytes, &CodecRegistry::default()).unwrap_err();
        assert!(err.is_format_error() || matches!(err, RecordingError::Codec { .. }));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = sample_bytes();
        bytes.extend_from_slice(&[0, 0]);
        let err = decode_recording(&bytes, &CodecRegistry::default()).unwrap_err();
        assert!(matches!(err, RecordingError::Malformed(_)));
    }

    #[test]
    fn test_bad_pool_index_rejected() {
        let mut bytes = sample_bytes();
        let data_offset = u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]) as usize;
        // Source index of the first sample
        bytes[data_offset + 8] = 0x7F;
        let err = decode_recording(&bytes, &CodecRegistry::default()).unwrap_err();
        assert!(matches!(err, RecordingError::PoolIndexOutOfRange { .. }));
    }

    #[test]
    fn test_unknown_importance_rejected() {
        let mut bytes = sample_bytes();
        let data_offset = u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]) as usize;
        bytes[data_offset - 1] = 9;
        let err = decode_recording(&bytes, &CodecRegistry::default()).unwrap_err();
        assert!(matches!(err, RecordingError::Malformed(_)));
    }

    #[test]
    fn test_missing_codec_aborts_load() {
        let mut codecs = CodecRegistry::empty();
        codecs.register(crate::codec::NumberCodec);
        let err = decode_recording(&sample_bytes(), &codecs).unwrap_err();
        assert!(matches!(err, RecordingError::MissingCodec(name) if name == "String"));
    }
}
