//! Recordings
//!
//! The in-memory model of recorded telemetry: samples, event markers, and
//! the thread-safe buffer the recorder appends to.

mod buffer;
mod marker;
mod sample;

pub use buffer::{RecordingBuffer, SessionStats};
pub use marker::{Marker, MarkerImportance};
pub use sample::Sample;

use std::collections::HashSet;

/// An ordered collection of samples and markers
///
/// The first/last bounds and the set of source IDs are maintained as samples
/// are appended, never by rescanning.
#[derive(Debug, Clone, Default)]
pub struct Recording {
    samples: Vec<Sample>,
    markers: Vec<Marker>,
    /// Index of the sample with the smallest timestamp
    first: Option<usize>,
    /// Index of the sample with the largest timestamp
    last: Option<usize>,
    source_ids: HashSet<String>,
}

impl Recording {
    /// Create an empty recording
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a recording from already-collected samples and markers
    pub fn from_parts(samples: Vec<Sample>, markers: Vec<Marker>) -> Self {
        let mut recording = Self {
            samples: Vec::with_capacity(samples.len()),
            markers,
            ..Self::default()
        };
        for sample in samples {
            recording.append(sample);
        }
        recording
    }

    /// Append a sample
    pub fn append(&mut self, sample: Sample) {
        let index = self.samples.len();
        let ts = sample.timestamp();

        if !self.source_ids.contains(sample.source_id()) {
            self.source_ids.insert(sample.source_id().to_string());
        }
        if self.first.map_or(true, |i| ts < self.samples[i].timestamp()) {
            self.first = Some(index);
        }
        if self.last.map_or(true, |i| ts > self.samples[i].timestamp()) {
            self.last = Some(index);
        }
        self.samples.push(sample);
    }

    /// Add an event marker
    pub fn add_marker(&mut self, marker: Marker) {
        self.markers.push(marker);
    }

    /// Samples in the order they were appended
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Event markers in the order they were added
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// The earliest sample
    pub fn first(&self) -> Option<&Sample> {
        self.first.map(|i| &self.samples[i])
    }

    /// The latest sample
    pub fn last(&self) -> Option<&Sample> {
        self.last.map(|i| &self.samples[i])
    }

    /// Time between the first and last samples, in milliseconds
    ///
    /// Recordings with fewer than two samples have a length of 0.
    pub fn length(&self) -> i64 {
        match (self.first(), self.last()) {
            (Some(first), Some(last)) => last.timestamp() - first.timestamp(),
            _ => 0,
        }
    }

    /// Distinct source IDs, sorted
    pub fn source_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.source_ids.iter().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Number of distinct source IDs
    pub fn source_count(&self) -> usize {
        self.source_ids.len()
    }

    /// Check whether a source appears in this recording
    pub fn contains_source(&self, source_id: &str) -> bool {
        self.source_ids.contains(source_id)
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check whether the recording has neither samples nor markers
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty() && self.markers.is_empty()
    }

    /// Sort samples into recording order, keeping ties in append order
    pub fn sort(&mut self) {
        if self
            .samples
            .windows(2)
            .all(|w| w[0].chronological(&w[1]).is_le())
        {
            return;
        }
        self.samples.sort_by(Sample::chronological);
        self.first = (!self.samples.is_empty()).then_some(0);
        // The last sample in sorted order may share its timestamp with earlier
        // ones; keep the first index holding the maximum timestamp.
        self.last = self.samples.last().map(|max| {
            self.samples
                .iter()
                .position(|s| s.timestamp() == max.timestamp())
                .unwrap_or(self.samples.len() - 1)
        });
    }

    /// Split into samples and markers
    pub fn into_parts(self) -> (Vec<Sample>, Vec<Marker>) {
        (self.samples, self.markers)
    }
}

impl PartialEq for Recording {
    fn eq(&self, other: &Self) -> bool {
        self.samples == other.samples && self.markers == other.markers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Value;

    #[test]
    fn test_bounds_tracked_incrementally() {
        let mut recording = Recording::new();
        assert_eq!(recording.length(), 0);
        assert!(recording.first().is_none());

        recording.append(Sample::of("/a", Value::Number(1.0), 40));
        assert_eq!(recording.length(), 0);

        recording.append(Sample::of("/b", Value::Number(2.0), 10));
        recording.append(Sample::of("/a", Value::Number(3.0), 90));

        assert_eq!(recording.first().unwrap().timestamp(), 10);
        assert_eq!(recording.last().unwrap().timestamp(), 90);
        assert_eq!(recording.length(), 80);
        assert_eq!(recording.source_ids(), vec!["/a", "/b"]);
    }

    #[test]
    fn test_sort_keeps_bounds() {
        let mut recording = Recording::from_parts(
            vec![
                Sample::of("/b", Value::Number(1.0), 20),
                Sample::of("/a", Value::Number(2.0), 20),
                Sample::of("/a", Value::Number(3.0), 5),
            ],
            vec![],
        );
        recording.sort();

        assert_eq!(recording.samples()[0].timestamp(), 5);
        assert_eq!(recording.samples()[1].source_id(), "/a");
        assert_eq!(recording.first().unwrap().timestamp(), 5);
        assert_eq!(recording.last().unwrap().timestamp(), 20);
        assert_eq!(recording.length(), 15);
    }
}
