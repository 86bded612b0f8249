//! Event markers

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Importance of a marked event
///
/// The wire tag of each level comes from [`MarkerImportance::tag`], not from
/// the declaration order of the variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MarkerImportance {
    /// Minor events that only matter when something goes wrong
    Trivial,
    /// Low-importance events
    Low,
    /// Ordinary events such as the start of a match period
    Normal,
    /// Important events
    High,
    /// Component failures, power loss, deadlocks, timeouts
    Critical,
}

/// Wire tag for every importance level
const IMPORTANCE_TAGS: [(MarkerImportance, u8, &str); 5] = [
    (MarkerImportance::Trivial, 0, "TRIVIAL"),
    (MarkerImportance::Low, 1, "LOW"),
    (MarkerImportance::Normal, 2, "NORMAL"),
    (MarkerImportance::High, 3, "HIGH"),
    (MarkerImportance::Critical, 4, "CRITICAL"),
];

impl MarkerImportance {
    /// All levels, lowest first
    pub const ALL: [MarkerImportance; 5] = [
        MarkerImportance::Trivial,
        MarkerImportance::Low,
        MarkerImportance::Normal,
        MarkerImportance::High,
        MarkerImportance::Critical,
    ];

    /// Stable wire tag of this level
    pub fn tag(self) -> u8 {
        IMPORTANCE_TAGS
            .iter()
            .find(|(level, _, _)| *level == self)
            .map(|(_, tag, _)| *tag)
            .unwrap_or_default()
    }

    /// Look up a level by its wire tag
    pub fn from_tag(tag: u8) -> Option<Self> {
        IMPORTANCE_TAGS
            .iter()
            .find(|(_, t, _)| *t == tag)
            .map(|(level, _, _)| *level)
    }

    /// Upper-case name of this level
    pub fn name(self) -> &'static str {
        IMPORTANCE_TAGS
            .iter()
            .find(|(level, _, _)| *level == self)
            .map(|(_, _, name)| *name)
            .unwrap_or("NORMAL")
    }
}

impl Default for MarkerImportance {
    fn default() -> Self {
        MarkerImportance::Normal
    }
}

impl fmt::Display for MarkerImportance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MarkerImportance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        IMPORTANCE_TAGS
            .iter()
            .find(|(_, _, name)| name.eq_ignore_ascii_case(wanted))
            .map(|(level, _, _)| *level)
            .ok_or_else(|| format!("Unknown marker importance: '{}'", s))
    }
}

/// A named, timestamped annotation of an event in a recording
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Marker {
    name: String,
    description: String,
    importance: MarkerImportance,
    timestamp: i64,
}

impl Marker {
    /// Create a new event marker
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        importance: MarkerImportance,
        timestamp: i64,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            importance,
            timestamp,
        }
    }

    /// Name of the marked event
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Description of the marked event, possibly empty
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Importance of the marked event
    pub fn importance(&self) -> MarkerImportance {
        self.importance
    }

    /// Milliseconds since the start of the recording
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}
