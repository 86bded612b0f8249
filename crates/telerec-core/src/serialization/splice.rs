//! Mid-file byte insertion
//!
//! Files cannot grow in the middle, so inserting means moving the tail:
//! copy everything after the insertion point to a side file, truncate,
//! write the new bytes, then copy the tail back after them.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Insert `bytes` into `file` at `offset`, shifting the rest of the file back
///
/// Inserting at the end of the file is a plain append. The file position is
/// left at the end of the file.
pub fn insert_bytes(file: &mut File, offset: u64, bytes: &[u8]) -> io::Result<()> {
    let len = file.metadata()?.len();
    if offset > len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("insertion offset {} is past end of file ({} bytes)", offset, len),
        ));
    }
    if bytes.is_empty() {
        file.seek(SeekFrom::End(0))?;
        return Ok(());
    }

    let tail_len = len - offset;
    let mut tail = tempfile::tempfile()?;
    if tail_len > 0 {
        file.seek(SeekFrom::Start(offset))?;
        let copied = io::copy(&mut Read::by_ref(file).take(tail_len), &mut tail)?;
        if copied != tail_len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("copied {} of {} tail bytes", copied, tail_len),
            ));
        }
        file.set_len(offset)?;
    }

    file.seek(SeekFrom::Start(offset))?;
    file.write_all(bytes)?;

    if tail_len > 0 {
        tail.seek(SeekFrom::Start(0))?;
        io::copy(&mut tail, file)?;
    }
    file.flush()
}

/// Overwrite a big-endian u32 at `offset` without shifting anything
pub(crate) fn write_u32_at(file: &mut File, offset: u64, value: u32) -> io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(&value.to_be_bytes())
}
