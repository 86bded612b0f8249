//! Recording errors

use std::path::PathBuf;

use thiserror::Error;

use crate::codec::CodecError;

/// Errors that can occur while saving, loading, updating or replaying a recording
#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("Wrong magic number in header: expected {expected:#010x}, got {actual:#010x}")]
    InvalidMagic { expected: u32, actual: u32 },

    #[error("Unsupported recording format version {actual} (this build reads version {expected})")]
    UnsupportedVersion { expected: u32, actual: u32 },

    #[error("Malformed recording file: {0}")]
    Malformed(String),

    #[error("No codec registered for data type '{0}'")]
    MissingCodec(String),

    #[error("Codec error for data type '{data_type}': {source}")]
    Codec {
        data_type: String,
        #[source]
        source: CodecError,
    },

    #[error("Too many constant pool entries ({count}), at most {max} are allowed")]
    PoolOverflow { count: usize, max: usize },

    #[error("Constant pool index {index} out of range (pool has {len} entries)")]
    PoolIndexOutOfRange { index: u16, len: usize },

    #[error("Frame number out of bounds: {frame}, must be in the range [0, {max}]")]
    FrameOutOfRange { frame: usize, max: usize },

    #[error("Recording has no frames")]
    EmptyRecording,

    #[error("Another save or update is already writing to {}", .0.display())]
    ConcurrentUpdate(PathBuf),

    #[error("Recording file too large: offset {0} does not fit in 32 bits")]
    FileTooLarge(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the recording engine
pub type Result<T> = std::result::Result<T, RecordingError>;

impl RecordingError {
    /// Shorthand for a structural format violation
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        RecordingError::Malformed(message.into())
    }

    /// Whether this error indicates a file that is not a valid recording
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            RecordingError::InvalidMagic { .. }
                | RecordingError::UnsupportedVersion { .. }
                | RecordingError::Malformed(_)
                | RecordingError::PoolIndexOutOfRange { .. }
        )
    }
}
