//! Recorder configuration
//!
//! Stored as pretty-printed JSON. Fields missing from the file take their
//! default values, so older config files keep loading.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Placeholder in [`RecorderConfig::file_name_format`] replaced by the session start time
pub const TIME_PLACEHOLDER: &str = "${time}";

/// File extension of recording files
pub const RECORDING_EXTENSION: &str = "rec";

/// Recorder settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Root directory; each day's recordings go in a dated subdirectory
    pub recordings_dir: PathBuf,

    /// File name without extension; `${time}` becomes `HH.mm.ss`
    pub file_name_format: String,

    /// Time between periodic flushes in milliseconds
    pub flush_interval_ms: u64,

    /// Flush whatever is buffered when the recorder stops
    pub flush_on_stop: bool,

    /// Write to disk at all (false keeps everything in the buffer)
    pub disk_writes: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            recordings_dir: Self::default_recordings_dir(),
            file_name_format: format!("recording-{}", TIME_PLACEHOLDER),
            flush_interval_ms: 2000,
            flush_on_stop: true,
            disk_writes: true,
        }
    }
}

impl RecorderConfig {
    /// Default recordings directory in the user's data directory
    pub fn default_recordings_dir() -> PathBuf {
        dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("telerec")
            .join("recordings")
    }

    /// Configuration that never touches the disk
    pub fn in_memory() -> Self {
        Self {
            disk_writes: false,
            ..Self::default()
        }
    }

    /// Configuration writing into `dir`
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            recordings_dir: dir.into(),
            ..Self::default()
        }
    }

    /// Flush interval as a duration (at least one millisecond)
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }

    /// Load a config file
    pub fn load(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Load a config file, falling back to defaults if it does not exist
    pub fn load_or_default(path: &Path) -> io::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save to a config file, creating parent directories
    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, content)
    }

    /// Path of the recording file for a session started at `start`
    pub fn recording_path(&self, start: DateTime<Local>) -> PathBuf {
        recording_path(&self.recordings_dir, &self.file_name_format, start)
    }

    /// Like [`recording_path`](Self::recording_path), numbered `-1`, `-2`, ...
    /// when a file already exists there
    pub fn available_recording_path(&self, start: DateTime<Local>) -> PathBuf {
        let path = self.recording_path(start);
        if !path.exists() {
            return path;
        }
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut n = 1u32;
        loop {
            let candidate =
                path.with_file_name(format!("{}-{}.{}", stem, n, RECORDING_EXTENSION));
            if !candidate.exists() {
                return candidate;
            }
            n += 1;
        }
    }
}

/// `<dir>/<YYYY-MM-DD>/<format with ${time} as HH.mm.ss>.rec`
pub fn recording_path(dir: &Path, file_name_format: &str, start: DateTime<Local>) -> PathBuf {
    let day = start.format("%Y-%m-%d").to_string();
    let time = start.format("%H.%M.%S").to_string();
    let name = file_name_format.replace(TIME_PLACEHOLDER, &time);
    dir.join(day).join(format!("{}.{}", name, RECORDING_EXTENSION))
}
