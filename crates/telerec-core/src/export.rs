//! CSV export
//!
//! Flattens a recording into one row per moment in time, for spreadsheets
//! and other analysis tools. Samples and markers whose timestamps fall within
//! a small window of the first entry of a row are collated into that row,
//! since values updated together rarely carry identical timestamps.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::codec::Value;
use crate::recording::{Marker, Recording, Sample};

/// Default collation window in milliseconds
pub const DEFAULT_WINDOW_MS: i64 = 7;

/// Fixed leading CSV columns
pub const FIXED_COLUMNS: [&str; 4] = ["Timestamp", "Event", "Event Description", "Event Severity"];

/// Export options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSettings {
    /// Include metadata sources (path segments starting with `.` or wrapped in `~`)
    pub include_metadata: bool,
    /// Collation window in milliseconds
    pub window_ms: i64,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            include_metadata: false,
            window_ms: DEFAULT_WINDOW_MS,
        }
    }
}

/// Whether a source ID names dashboard metadata rather than telemetry
pub fn is_metadata(source_id: &str) -> bool {
    source_id.split('/').any(|segment| {
        segment.starts_with('.')
            || (segment.len() > 2
                && segment.starts_with('~')
                && segment.ends_with('~')
                && segment[1..segment.len() - 1]
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '_'))
    })
}

/// One flattened row
#[derive(Debug, Clone, PartialEq)]
pub struct Row<'a> {
    /// Timestamp of the first entry collated into this row
    pub timestamp: i64,
    /// Markers in this row; at most one is written
    pub markers: Vec<&'a Marker>,
    /// Samples in this row, in timestamp order
    pub samples: Vec<&'a Sample>,
}

enum Entry<'a> {
    Sample(&'a Sample),
    Marker(&'a Marker),
}

impl Entry<'_> {
    fn timestamp(&self) -> i64 {
        match self {
            Entry::Sample(s) => s.timestamp(),
            Entry::Marker(m) => m.timestamp(),
        }
    }
}

/// Collate samples and markers into rows, oldest first
pub fn flatten<'a>(recording: &'a Recording, settings: &ExportSettings) -> Vec<Row<'a>> {
    let window = settings.window_ms.max(0);
    let mut entries: Vec<Entry<'a>> = recording
        .samples()
        .iter()
        .filter(|s| settings.include_metadata || !is_metadata(s.source_id()))
        .map(Entry::Sample)
        .chain(recording.markers().iter().map(Entry::Marker))
        .collect();
    entries.sort_by_key(Entry::timestamp);

    let mut rows = Vec::new();
    let mut i = 0;
    while i < entries.len() {
        let timestamp = entries[i].timestamp();
        let mut row = Row {
            timestamp,
            markers: Vec::new(),
            samples: Vec::new(),
        };
        while i < entries.len() && entries[i].timestamp() <= timestamp + window {
            match entries[i] {
                Entry::Sample(s) => row.samples.push(s),
                Entry::Marker(m) => row.markers.push(m),
            }
            i += 1;
        }
        rows.push(row);
    }
    rows
}

/// Column headers: the fixed columns, then every exported source ID sorted
pub fn header(recording: &Recording, settings: &ExportSettings) -> Vec<String> {
    FIXED_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(
            recording
                .source_ids()
                .into_iter()
                .filter(|id| settings.include_metadata || !is_metadata(id))
                .map(str::to_string),
        )
        .collect()
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn write_record<W: Write>(writer: &mut W, fields: &[String]) -> io::Result<()> {
    let line: Vec<String> = fields.iter().map(|f| escape(f)).collect();
    writeln!(writer, "{}", line.join(","))
}

fn cell(value: &Value) -> String {
    value.to_string()
}

/// Write a recording as CSV
pub fn write_csv<W: Write>(
    writer: &mut W,
    recording: &Recording,
    settings: &ExportSettings,
) -> io::Result<()> {
    let header = header(recording, settings);
    write_record(writer, &header)?;

    for row in flatten(recording, settings) {
        let mut fields = vec![String::new(); header.len()];
        fields[0] = row.timestamp.to_string();

        if let Some((first, extra)) = row.markers.split_first() {
            fields[1] = first.name().to_string();
            fields[2] = first.description().to_string();
            fields[3] = first.importance().name().to_string();
            for marker in extra {
                tracing::warn!(
                    "Multiple event markers near timestamp {}, skipping '{}'",
                    row.timestamp,
                    marker.name()
                );
            }
        }

        for sample in &row.samples {
            if let Some(index) = header.iter().position(|h| h == sample.source_id()) {
                fields[index] = cell(sample.value());
            }
        }
        write_record(writer, &fields)?;
    }
    Ok(())
}

/// Convert a recording to CSV text
pub fn to_csv_string(recording: &Recording, settings: &ExportSettings) -> String {
    let mut out = Vec::new();
    // Writing into a Vec cannot fail
    let _ = write_csv(&mut out, recording, settings);
    String::from_utf8_lossy(&out).into_owned()
}

/// Export a recording to a CSV file
pub fn export_csv<P: AsRef<Path>>(
    path: P,
    recording: &Recording,
    settings: &ExportSettings,
) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_csv(&mut writer, recording, settings)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::MarkerImportance;
    use pretty_assertions::assert_eq;

    fn recording() -> Recording {
        Recording::from_parts(
            vec![
                Sample::of("/b", Value::Number(1.5), 0),
                Sample::of("/a", Value::from("x,y"), 3),
                Sample::of("/b", Value::Number(2.5), 20),
                Sample::of("/.metadata/Type", Value::from("Gyro"), 0),
            ],
            vec![Marker::new("Auto Start", "", MarkerImportance::Normal, 0)],
        )
    }

    #[test]
    fn test_metadata_detection() {
        assert!(is_metadata("/SmartDashboard/.type"));
        assert!(is_metadata("/LiveWindow/~STATUS~"));
        assert!(!is_metadata("/SmartDashboard/Speed"));
        assert!(!is_metadata("/a~b"));
    }

    #[test]
    fn test_flatten_collates_window() {
        let recording = recording();
        let rows = flatten(&recording, &ExportSettings::default());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].timestamp, 0);
        assert_eq!(rows[0].markers.len(), 1);
        assert_eq!(rows[0].samples.len(), 2);
        assert_eq!(rows[1].timestamp, 20);
    }

    #[test]
    fn test_csv_output() {
        let csv = to_csv_string(&recording(), &ExportSettings::default());
        assert_eq!(
            csv,
            "Timestamp,Event,Event Description,Event Severity,/a,/b\n\
             0,Auto Start,,NORMAL,\"x,y\",1.5\n\
             20,,,,,2.5\n"
        );
    }

    #[test]
    fn test_csv_with_metadata() {
        let settings = ExportSettings {
            include_metadata: true,
            ..ExportSettings::default()
        };
        let header = header(&recording(), &settings);
        assert_eq!(header[4], "/.metadata/Type");
    }

    #[test]
    fn test_empty_recording() {
        let csv = to_csv_string(&Recording::new(), &ExportSettings::default());
        assert_eq!(csv, "Timestamp,Event,Event Description,Event Severity\n");
    }
}
