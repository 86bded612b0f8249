//! Timestamped samples

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::codec::Value;

/// One telemetry observation of a source at an instant
///
/// The timestamp is measured in milliseconds since the start of the recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    source_id: String,
    data_type: String,
    value: Value,
    timestamp: i64,
}

impl Sample {
    /// Create a new sample
    pub fn new(
        source_id: impl Into<String>,
        data_type: impl Into<String>,
        value: Value,
        timestamp: i64,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            data_type: data_type.into(),
            value,
            timestamp,
        }
    }

    /// Create a sample whose data type is the built-in type for its value
    pub fn of(source_id: impl Into<String>, value: Value, timestamp: i64) -> Self {
        let data_type = value.default_data_type();
        Self::new(source_id, data_type, value, timestamp)
    }

    /// ID of the source this sample came from
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Data-type name, resolved through the codec registry
    pub fn data_type(&self) -> &str {
        &self.data_type
    }

    /// The recorded value
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Milliseconds since the start of the recording
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Recording order: by timestamp, then by source ID
    pub fn chronological(&self, other: &Sample) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.source_id.cmp(&other.source_id))
    }
}
