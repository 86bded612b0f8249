//! Incremental updates
//!
//! Extends an existing recording file with new samples and markers without
//! rewriting the samples already in it. New constant pool entries are
//! spliced in after the existing pool, new markers right before the data
//! section, and new samples appended at the end. The header is patched in
//! place.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use super::guard::WriteGuard;
use super::splice::{insert_bytes, write_u32_at};
use super::writer::{encode_samples, save_snapshot, sorted_samples};
use super::{
    encode_marker_entries, to_offset, ByteReader, ConstantPool, Header, WriteSummary,
    HEADER_SIZE, POOL_OFFSET,
};
use crate::codec::CodecRegistry;
use crate::error::{RecordingError, Result};
use crate::recording::{Recording, RecordingBuffer};

fn file_len(path: &Path) -> Result<u64> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

/// Read exactly `len` bytes starting at `offset`
fn read_at(file: &mut File, offset: u64, len: usize) -> Result<Vec<u8>> {
    let mut bytes = vec![0u8; len];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut bytes).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            RecordingError::malformed(format!(
                "unexpected end of file reading {} bytes at offset {}",
                len, offset
            ))
        } else {
            e.into()
        }
    })?;
    Ok(bytes)
}

/// Extend the file at `path` with `snapshot`
///
/// The caller must hold the write guard for `path`.
fn append_snapshot(snapshot: &Recording, path: &Path, codecs: &CodecRegistry) -> Result<WriteSummary> {
    let len = file_len(path)?;
    if len == 0 {
        return save_snapshot(snapshot, path, codecs);
    }

    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    let mut header = Header::decode(&read_at(&mut file, 0, HEADER_SIZE.min(len as usize))?)?;
    if u64::from(header.data_offset) > len {
        return Err(RecordingError::malformed(format!(
            "data section starts at {} but the file is only {} bytes",
            header.data_offset, len
        )));
    }

    let pool_bytes = read_at(
        &mut file,
        POOL_OFFSET,
        header.markers_offset as usize - HEADER_SIZE,
    )?;
    let mut pool = ConstantPool::decode(&pool_bytes)?;
    let marker_count = ByteReader::new(
        &read_at(&mut file, u64::from(header.markers_offset), 4)?,
        0,
    )
    .read_u32("marker count")?;

    if snapshot.is_empty() {
        return Ok(WriteSummary::default());
    }

    // Encode everything before touching the file so a codec failure leaves it intact
    let samples = sorted_samples(snapshot);
    let existing_entries = pool.len();
    for sample in &samples {
        pool.intern(sample.source_id())?;
        pool.intern(sample.data_type())?;
    }
    let pool_suffix = pool.encode_entries(existing_entries);
    let marker_entries = encode_marker_entries(snapshot.markers());
    let data = encode_samples(&samples, &pool, codecs)?;

    let markers_offset = u64::from(header.markers_offset) + pool_suffix.len() as u64;
    let data_offset = u64::from(header.data_offset) + pool_suffix.len() as u64;
    let new_data_offset = data_offset + marker_entries.len() as u64;
    let data_count = u64::from(header.data_count) + samples.len() as u64;
    let new_marker_count = u64::from(marker_count) + snapshot.markers().len() as u64;

    header.markers_offset = to_offset(markers_offset)?;
    header.data_offset = to_offset(new_data_offset)?;
    header.data_count = u32::try_from(data_count).map_err(|_| RecordingError::FileTooLarge(data_count))?;
    let new_marker_count =
        u32::try_from(new_marker_count).map_err(|_| RecordingError::FileTooLarge(new_marker_count))?;

    if !pool_suffix.is_empty() {
        let pool_end = markers_offset - pool_suffix.len() as u64;
        insert_bytes(&mut file, pool_end, &pool_suffix)?;
        write_u32_at(&mut file, POOL_OFFSET, pool.len() as u32)?;
    }

    if !marker_entries.is_empty() {
        insert_bytes(&mut file, data_offset, &marker_entries)?;
        write_u32_at(&mut file, markers_offset, new_marker_count)?;
    }

    if !data.is_empty() {
        file.seek(SeekFrom::End(0))?;
        file.write_all(&data)?;
    }

    file.seek(SeekFrom::Start(0))?;
    file.write_all(&header.encode())?;
    file.flush()?;

    let added = (pool_suffix.len() + marker_entries.len() + data.len()) as u64;
    tracing::debug!(
        "Updated recording {} (+{} samples, +{} markers, +{} pool entries, +{} bytes)",
        path.display(),
        samples.len(),
        snapshot.markers().len(),
        pool.len() - existing_entries,
        added
    );
    Ok(WriteSummary {
        samples: samples.len(),
        markers: snapshot.markers().len(),
        pool_entries: pool.len() - existing_entries,
        bytes: added,
        full_save: false,
    })
}

/// Drain `buffer` and add its contents to the recording file at `path`
///
/// A missing or empty file gets a full save instead. Draining an empty
/// buffer leaves the file byte-for-byte unchanged.
pub fn update_recording(
    buffer: &RecordingBuffer,
    path: impl AsRef<Path>,
    codecs: &CodecRegistry,
) -> Result<WriteSummary> {
    let path = path.as_ref();
    let _guard = WriteGuard::acquire(path)?;
    let snapshot = buffer.take_snapshot_and_clear();
    append_snapshot(&snapshot, path, codecs)
}

/// Add the samples and markers of an owned recording to the file at `path`
pub fn append_recording(
    recording: &Recording,
    path: impl AsRef<Path>,
    codecs: &CodecRegistry,
) -> Result<WriteSummary> {
    let path = path.as_ref();
    let _guard = WriteGuard::acquire(path)?;
    append_snapshot(recording, path, codecs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Value;
    use crate::recording::{Marker, MarkerImportance, Sample};
    use crate::serialization::{encode_recording, load_recording, write_recording};

    #[test]
    fn test_update_missing_file_does_full_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.rec");
        let batch = Recording::from_parts(vec![Sample::of("/a", Value::Number(1.0), 0)], vec![]);

        let summary = append_recording(&batch, &path, &CodecRegistry::default()).unwrap();
        assert!(summary.full_save);
        assert_eq!(
            fs::read(&path).unwrap(),
            encode_recording(&batch, &CodecRegistry::default()).unwrap()
        );
    }

    #[test]
    fn test_update_with_only_known_strings_is_pure_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("append.rec");
        let codecs = CodecRegistry::default();
        let first = Recording::from_parts(vec![Sample::of("/a", Value::Number(1.0), 0)], vec![]);
        write_recording(&first, &path, &codecs).unwrap();
        let before = fs::read(&path).unwrap();

        let second = Recording::from_parts(vec![Sample::of("/a", Value::Number(2.0), 10)], vec![]);
        let summary = append_recording(&second, &path, &codecs).unwrap();
        assert_eq!(summary.pool_entries, 0);
        assert_eq!(summary.bytes, 8 + 2 + 2 + 8);

        let after = fs::read(&path).unwrap();
        // Only the data count changed in the prefix
        assert_eq!(&after[..8], &before[..8]);
        assert_eq!(&after[8..12], &[0, 0, 0, 2]);
        assert_eq!(&after[12..before.len()], &before[12..]);
    }

    #[test]
    fn test_update_splices_pool_and_markers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("splice.rec");
        let codecs = CodecRegistry::default();
        write_recording(
            &Recording::from_parts(
                vec![Sample::of("/a", Value::Number(1.0), 0)],
                vec![Marker::new("one", "", MarkerImportance::Low, 0)],
            ),
            &path,
            &codecs,
        )
        .unwrap();

        append_recording(
            &Recording::from_parts(
                vec![Sample::of("/b", Value::Boolean(true), 5)],
                vec![Marker::new("two", "second", MarkerImportance::High, 5)],
            ),
            &path,
            &codecs,
        )
        .unwrap();

        let loaded = load_recording(&path, &codecs).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.markers().len(), 2);
        assert_eq!(loaded.markers()[1].description(), "second");
        assert_eq!(loaded.samples()[1].value(), &Value::Boolean(true));
    }

    #[test]
    fn test_codec_failure_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intact.rec");
        let codecs = CodecRegistry::default();
        write_recording(
            &Recording::from_parts(vec![Sample::of("/a", Value::Number(1.0), 0)], vec![]),
            &path,
            &codecs,
        )
        .unwrap();
        let before = fs::read(&path).unwrap();

        let bad = Recording::from_parts(
            vec![Sample::new("/new", "Number", Value::Boolean(true), 3)],
            vec![Marker::new("m", "", MarkerImportance::Normal, 3)],
        );
        let err = append_recording(&bad, &path, &codecs).unwrap_err();
        assert!(matches!(err, RecordingError::Codec { .. }));
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_update_rejects_foreign_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foreign.rec");
        fs::write(&path, b"not a recording file at all").unwrap();

        let batch = Recording::from_parts(vec![Sample::of("/a", Value::Number(1.0), 0)], vec![]);
        let err = append_recording(&batch, &path, &CodecRegistry::default()).unwrap_err();
        assert!(matches!(err, RecordingError::InvalidMagic { .. }));
        assert_eq!(fs::read(&path).unwrap(), b"not a recording file at all");
    }
}
