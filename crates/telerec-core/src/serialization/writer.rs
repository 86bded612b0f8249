//! Full saves
//!
//! Writes a complete recording file in one sequential pass.

use std::fs;
use std::path::Path;

use super::guard::WriteGuard;
use super::{
    encode_marker_entries, put_i64, put_u16, put_u32, to_offset, ConstantPool, Header,
    WriteSummary, FORMAT_VERSION, HEADER_SIZE, SIZE_OF_INT,
};
use crate::codec::CodecRegistry;
use crate::error::{RecordingError, Result};
use crate::recording::{Recording, RecordingBuffer, Sample};

/// Samples of a recording in file order
pub(crate) fn sorted_samples(recording: &Recording) -> Vec<&Sample> {
    let mut samples: Vec<&Sample> = recording.samples().iter().collect();
    samples.sort_by(|a, b| a.chronological(b));
    samples
}

/// Encode the data-section entries for `samples`
pub(crate) fn encode_samples(
    samples: &[&Sample],
    pool: &ConstantPool,
    codecs: &CodecRegistry,
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for sample in samples {
        let index = |value: &str| {
            pool.index_of(value).ok_or_else(|| {
                RecordingError::malformed(format!("'{}' is missing from the constant pool", value))
            })
        };
        let source_index = index(sample.source_id())?;
        let type_index = index(sample.data_type())?;
        let payload = codecs.encode(sample.data_type(), sample.value())?;

        put_i64(&mut out, sample.timestamp());
        put_u16(&mut out, source_index);
        put_u16(&mut out, type_index);
        out.extend_from_slice(&payload);
    }
    Ok(out)
}

/// Encode a whole recording file
///
/// Samples are written in `(timestamp, source_id)` order regardless of the
/// order they were appended in.
pub fn encode_recording(recording: &Recording, codecs: &CodecRegistry) -> Result<Vec<u8>> {
    let samples = sorted_samples(recording);
    let pool = ConstantPool::from_samples(samples.iter().copied())?;

    let pool_bytes = pool.encode();
    let marker_entries = encode_marker_entries(recording.markers());
    let data = encode_samples(&samples, &pool, codecs)?;

    let markers_offset = (HEADER_SIZE + pool_bytes.len()) as u64;
    let data_offset = markers_offset + (SIZE_OF_INT + marker_entries.len()) as u64;
    let header = Header {
        version: FORMAT_VERSION,
        data_count: u32::try_from(samples.len())
            .map_err(|_| RecordingError::FileTooLarge(samples.len() as u64))?,
        markers_offset: to_offset(markers_offset)?,
        data_offset: to_offset(data_offset)?,
    };

    let mut out = Vec::with_capacity(data_offset as usize + data.len());
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(&pool_bytes);
    put_u32(&mut out, recording.markers().len() as u32);
    out.extend_from_slice(&marker_entries);
    out.extend_from_slice(&data);
    Ok(out)
}

/// Write an encoded recording to `path`, replacing any existing file
///
/// The caller must hold the write guard for `path`.
pub(crate) fn save_snapshot(
    recording: &Recording,
    path: &Path,
    codecs: &CodecRegistry,
) -> Result<WriteSummary> {
    let bytes = encode_recording(recording, codecs)?;
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, &bytes)?;

    let pool_entries = ConstantPool::from_samples(recording.samples())?.len();
    tracing::debug!(
        "Saved recording to {} ({} samples, {} markers, {} bytes)",
        path.display(),
        recording.len(),
        recording.markers().len(),
        bytes.len()
    );
    Ok(WriteSummary {
        samples: recording.len(),
        markers: recording.markers().len(),
        pool_entries,
        bytes: bytes.len() as u64,
        full_save: true,
    })
}

/// Drain `buffer` and write everything in it as a new file at `path`
///
/// Missing parent directories are created. An existing file is replaced.
pub fn save_recording(
    buffer: &RecordingBuffer,
    path: impl AsRef<Path>,
    codecs: &CodecRegistry,
) -> Result<WriteSummary> {
    let path = path.as_ref();
    let _guard = WriteGuard::acquire(path)?;
    let snapshot = buffer.take_snapshot_and_clear();
    save_snapshot(&snapshot, path, codecs)
}

/// Write an owned recording as a new file at `path`
pub fn write_recording(
    recording: &Recording,
    path: impl AsRef<Path>,
    codecs: &CodecRegistry,
) -> Result<WriteSummary> {
    let path = path.as_ref();
    let _guard = WriteGuard::acquire(path)?;
    save_snapshot(recording, path, codecs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Value;
    use crate::recording::{Marker, MarkerImportance};

    #[test]
    fn test_encode_empty_recording() {
        let bytes = encode_recording(&Recording::new(), &CodecRegistry::default()).unwrap();
        assert_eq!(
            bytes,
            vec![
                0xFE, 0xED, 0xBA, 0xC4, // magic
                0, 0, 0, 2, // version
                0, 0, 0, 0, // data count
                0, 0, 0, 24, // markers offset
                0, 0, 0, 28, // data offset
                0, 0, 0, 0, // pool count
                0, 0, 0, 0, // marker count
            ]
        );
    }

    #[test]
    fn test_encode_exact_layout() {
        let recording = Recording::from_parts(
            vec![Sample::of("/a", Value::Boolean(true), 7)],
            vec![Marker::new("m", "", MarkerImportance::High, 3)],
        );
        let bytes = encode_recording(&recording, &CodecRegistry::default()).unwrap();

        let pool_len = 4 + (4 + 2) + (4 + 7); // "/a", "Boolean"
        let markers_offset = HEADER_SIZE + pool_len;
        let data_offset = markers_offset + 4 + 8 + (4 + 1) + 4 + 1;
        assert_eq!(&bytes[12..16], &(markers_offset as u32).to_be_bytes());
        assert_eq!(&bytes[16..20], &(data_offset as u32).to_be_bytes());
        assert_eq!(bytes[data_offset - 1], MarkerImportance::High.tag());
        assert_eq!(
            &bytes[data_offset..],
            &[0, 0, 0, 0, 0, 0, 0, 7, 0, 0, 0, 1, 1]
        );
    }

    #[test]
    fn test_encode_without_codec_fails() {
        let recording =
            Recording::from_parts(vec![Sample::of("/a", Value::Number(1.0), 0)], vec![]);
        let err = encode_recording(&recording, &CodecRegistry::empty()).unwrap_err();
        assert!(matches!(err, RecordingError::MissingCodec(_)));
    }

    #[test]
    fn test_save_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("run.rec");
        let buffer = RecordingBuffer::new();
        buffer.append(Sample::of("/a", Value::Number(1.0), 0));

        let summary = save_recording(&buffer, &path, &CodecRegistry::default()).unwrap();
        assert!(path.exists());
        assert!(summary.full_save);
        assert_eq!(summary.samples, 1);
        assert_eq!(summary.pool_entries, 2);
        assert!(buffer.is_empty());
    }
}
