//! Per-path writer exclusion
//!
//! Saves and updates of one file must not overlap. Holding a [`WriteGuard`]
//! for a path makes any other save or update of that path in this process
//! fail with `ConcurrentUpdate` instead of interleaving.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use crate::error::{RecordingError, Result};

fn active_paths() -> &'static Mutex<HashSet<PathBuf>> {
    static ACTIVE: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    ACTIVE.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Normalizes a path so different spellings of one file share a key
fn key_for(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    // The file may not exist yet; canonicalize the directory instead.
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => parent
            .canonicalize()
            .map(|dir| dir.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}

/// Exclusive claim on writing one recording file
#[derive(Debug)]
pub(crate) struct WriteGuard {
    key: PathBuf,
}

impl WriteGuard {
    pub(crate) fn acquire(path: &Path) -> Result<Self> {
        let key = key_for(path);
        let mut active = active_paths()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !active.insert(key.clone()) {
            return Err(RecordingError::ConcurrentUpdate(path.to_path_buf()));
        }
        Ok(Self { key })
    }
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        let mut active = active_paths()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        active.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_writer_rejected_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.rec");

        let guard = WriteGuard::acquire(&path).unwrap();
        let err = WriteGuard::acquire(&dir.path().join(".").join("a.rec")).unwrap_err();
        assert!(matches!(err, RecordingError::ConcurrentUpdate(_)));

        drop(guard);
        assert!(WriteGuard::acquire(&path).is_ok());
    }
}
