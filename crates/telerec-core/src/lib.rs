//! # telerec Core Library
//!
//! Recording engine for robot telemetry dashboards.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - A thread-safe recording buffer that producers append samples and markers to
//! - A compact binary recording format with full saves, loads and
//!   incremental in-place updates
//! - A recorder that periodically flushes a live session to disk
//! - Timed playback of recordings into live data sources
//! - CSV export and a simulated robot for demos
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use telerec_core::prelude::*;
//!
//! let codecs = Arc::new(CodecRegistry::default());
//! let sources = Arc::new(SourceRegistry::new());
//!
//! // Record everything published to the sources
//! let recorder = Recorder::with_sources(RecorderConfig::default(), codecs.clone(), sources.clone());
//! recorder.start()?;
//! sources.publish("/SmartDashboard/Battery", Value::Number(12.3));
//! recorder.add_marker("Auto Start", "", MarkerImportance::Normal);
//! recorder.stop()?;
//!
//! // Replay it
//! let file = recorder.recording_file().unwrap();
//! let playback = Playback::load(&file, &codecs, sources)?;
//! playback.start()?;
//! ```

pub mod codec;
pub mod config;
pub mod demo;
pub mod error;
pub mod export;
pub mod playback;
pub mod recorder;
pub mod recording;
pub mod serialization;
pub mod source;

pub use error::{RecordingError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::codec::{Codec, CodecRegistry, Value};
    pub use crate::config::RecorderConfig;
    pub use crate::error::{RecordingError, Result};
    pub use crate::playback::{Playback, PlaybackStatus};
    pub use crate::recorder::{Recorder, RecorderStatus};
    pub use crate::recording::{
        Marker, MarkerImportance, Recording, RecordingBuffer, Sample, SessionStats,
    };
    pub use crate::serialization::{
        load_recording, save_recording, update_recording, write_recording, WriteSummary,
    };
    pub use crate::source::{DataSource, LiveSource, SourceRegistry};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
