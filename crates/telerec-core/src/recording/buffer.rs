//! Recording buffer
//!
//! Thread-safe, append-only log that producers write into and the flush
//! thread periodically drains.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use super::{Marker, Recording, Sample};

/// Totals accumulated over every snapshot of a session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Earliest sample timestamp seen
    pub first_timestamp: Option<i64>,
    /// Latest sample timestamp seen
    pub last_timestamp: Option<i64>,
    /// Total samples appended
    pub sample_count: u64,
    /// Total markers added
    pub marker_count: u64,
    /// Number of distinct source IDs seen
    pub source_count: usize,
}

impl SessionStats {
    /// Time between the first and last samples, in milliseconds
    pub fn length(&self) -> i64 {
        match (self.first_timestamp, self.last_timestamp) {
            (Some(first), Some(last)) => last - first,
            _ => 0,
        }
    }
}

#[derive(Debug, Default)]
struct BufferState {
    pending: Recording,
    stats: SessionStats,
    seen_sources: HashSet<String>,
}

/// Append-only recording log shared between producer threads and the flusher
///
/// All state lives behind a single mutex. Draining swaps the pending
/// recording for an empty one, so the critical section does no copying.
#[derive(Debug, Default)]
pub struct RecordingBuffer {
    state: Mutex<BufferState>,
}

impl RecordingBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        // A panicking producer cannot leave the state half-updated in a way
        // that matters here, so keep going with whatever is inside.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a sample
    pub fn append(&self, sample: Sample) {
        let mut guard = self.lock();
        let state = &mut *guard;
        let ts = sample.timestamp();
        let stats = &mut state.stats;
        stats.sample_count += 1;
        stats.first_timestamp = Some(stats.first_timestamp.map_or(ts, |f| f.min(ts)));
        stats.last_timestamp = Some(stats.last_timestamp.map_or(ts, |l| l.max(ts)));
        if !state.seen_sources.contains(sample.source_id()) {
            state.seen_sources.insert(sample.source_id().to_string());
            stats.source_count = state.seen_sources.len();
        }
        state.pending.append(sample);
    }

    /// Add an event marker
    pub fn add_marker(&self, marker: Marker) {
        let mut state = self.lock();
        state.stats.marker_count += 1;
        state.pending.add_marker(marker);
    }

    /// Take everything appended so far and reset the buffer to empty
    ///
    /// Every append that completed before this call is in the returned
    /// recording; every later append goes to the next snapshot.
    pub fn take_snapshot_and_clear(&self) -> Recording {
        std::mem::take(&mut self.lock().pending)
    }

    /// Number of samples waiting to be drained
    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Check whether nothing is waiting to be drained
    pub fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }

    /// Totals for the whole session, including already-drained data
    pub fn session_stats(&self) -> SessionStats {
        self.lock().stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Value;
    use crate::recording::MarkerImportance;

    #[test]
    fn test_snapshot_clears() {
        let buffer = RecordingBuffer::new();
        buffer.append(Sample::of("/a", Value::Number(1.0), 0));
        buffer.add_marker(Marker::new("m", "", MarkerImportance::Low, 0));

        let snapshot = buffer.take_snapshot_and_clear();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.markers().len(), 1);
        assert!(buffer.is_empty());
        assert!(buffer.take_snapshot_and_clear().is_empty());
    }

    #[test]
    fn test_stats_survive_snapshots() {
        let buffer = RecordingBuffer::new();
        buffer.append(Sample::of("/a", Value::Number(1.0), 30));
        let _ = buffer.take_snapshot_and_clear();
        buffer.append(Sample::of("/b", Value::Number(1.0), 10));
        buffer.append(Sample::of("/a", Value::Number(1.0), 70));

        let stats = buffer.session_stats();
        assert_eq!(stats.sample_count, 3);
        assert_eq!(stats.source_count, 2);
        assert_eq!(stats.first_timestamp, Some(10));
        assert_eq!(stats.length(), 60);
    }
}
