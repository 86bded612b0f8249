//! Recorder
//!
//! Lifecycle controller for a recording session. Producers call
//! [`Recorder::record`] (directly, or through a [`SourceRegistry`] the
//! recorder is attached to); a background thread drains the buffer to disk
//! every flush interval. The first flush of a session writes a complete file,
//! later flushes only append to it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use chrono::{DateTime, Local};

use crate::codec::{CodecRegistry, Value};
use crate::config::RecorderConfig;
use crate::error::{RecordingError, Result};
use crate::recording::{Marker, MarkerImportance, RecordingBuffer, Sample, SessionStats};
use crate::serialization::{save_recording, update_recording, WriteSummary};
use crate::source::{DataSource, SourceRegistry};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One start-to-stop recording session
#[derive(Debug)]
struct Session {
    buffer: Arc<RecordingBuffer>,
    started: Instant,
    started_at: DateTime<Local>,
    file: Option<PathBuf>,
    /// Whether the first full save happened; also serializes flushes
    saved: Mutex<bool>,
}

impl Session {
    fn new(config: &RecorderConfig) -> Self {
        let started_at = Local::now();
        Self {
            buffer: Arc::new(RecordingBuffer::new()),
            started: Instant::now(),
            started_at,
            file: config
                .disk_writes
                .then(|| config.available_recording_path(started_at)),
            saved: Mutex::new(false),
        }
    }

    fn timestamp(&self) -> i64 {
        i64::try_from(self.started.elapsed().as_millis()).unwrap_or(i64::MAX)
    }

    /// Write everything buffered so far, returning `None` without a file
    fn flush(&self, codecs: &CodecRegistry) -> Result<Option<WriteSummary>> {
        let Some(path) = &self.file else {
            return Ok(None);
        };
        let mut saved = lock(&self.saved);
        let summary = if *saved {
            update_recording(&self.buffer, path, codecs)?
        } else {
            let summary = save_recording(&self.buffer, path, codecs)?;
            *saved = true;
            summary
        };
        Ok(Some(summary))
    }
}

/// State shared with the flush thread and source listeners
#[derive(Debug)]
struct Shared {
    config: RecorderConfig,
    codecs: Arc<CodecRegistry>,
    running: AtomicBool,
    session: RwLock<Option<Arc<Session>>>,
}

impl Shared {
    fn session(&self) -> Option<Arc<Session>> {
        self.session.read().ok()?.clone()
    }

    /// Run `f` on the current session if running
    ///
    /// The session read lock is held across the check and `f`, so once
    /// [`halt`](Self::halt) returns no append can still land in the session.
    fn with_running_session(&self, f: impl FnOnce(&Session)) {
        let current = self
            .session
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        if let Some(session) = current.as_ref() {
            f(session);
        }
    }

    /// Clear the running flag, waiting out appends already in progress
    fn halt(&self) -> bool {
        let _current = self
            .session
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.running.swap(false, Ordering::SeqCst)
    }

    fn record(&self, source_id: &str, data_type: &str, value: Value) {
        self.with_running_session(|session| {
            let timestamp = session.timestamp();
            session
                .buffer
                .append(Sample::new(source_id, data_type, value, timestamp));
        });
    }

    fn add_marker(&self, name: &str, description: &str, importance: MarkerImportance) {
        self.with_running_session(|session| {
            let timestamp = session.timestamp();
            session
                .buffer
                .add_marker(Marker::new(name, description, importance, timestamp));
        });
    }
}

#[derive(Debug)]
struct FlushWorker {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl FlushWorker {
    fn spawn(shared: &Arc<Shared>, session: Arc<Session>) -> Result<Self> {
        let (stop, stop_rx) = mpsc::channel::<()>();
        let interval = shared.config.flush_interval();
        let codecs = Arc::clone(&shared.codecs);
        let handle = thread::Builder::new()
            .name("telerec-flush".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if let Err(e) = session.flush(&codecs) {
                            tracing::warn!("Periodic recording flush failed: {}", e);
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;
        Ok(Self { stop, handle })
    }

    fn shutdown(self) {
        let _ = self.stop.send(());
        if self.handle.join().is_err() {
            tracing::warn!("Recording flush thread panicked");
        }
    }
}

/// Snapshot of a recorder's state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderStatus {
    /// Whether a session is running
    pub running: bool,
    /// File of the current or last session
    pub file: Option<PathBuf>,
    /// Wall-clock start of the current or last session
    pub started_at: Option<DateTime<Local>>,
    /// Totals for the current or last session
    pub stats: SessionStats,
    /// Samples buffered but not yet written
    pub pending_samples: usize,
}

/// Records telemetry samples and markers into a recording file
pub struct Recorder {
    shared: Arc<Shared>,
    sources: Option<Arc<SourceRegistry>>,
    listener: Option<u64>,
    worker: Mutex<Option<FlushWorker>>,
}

impl Recorder {
    /// Create a stopped recorder
    pub fn new(config: RecorderConfig, codecs: Arc<CodecRegistry>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                codecs,
                running: AtomicBool::new(false),
                session: RwLock::new(None),
            }),
            sources: None,
            listener: None,
            worker: Mutex::new(None),
        }
    }

    /// Create a stopped recorder that records every value published to `sources`
    pub fn with_sources(
        config: RecorderConfig,
        codecs: Arc<CodecRegistry>,
        sources: Arc<SourceRegistry>,
    ) -> Self {
        let mut recorder = Self::new(config, codecs);
        let weak: Weak<Shared> = Arc::downgrade(&recorder.shared);
        let listener = sources.subscribe(Arc::new(move |id: &str, ty: &str, value: &Value| {
            if let Some(shared) = weak.upgrade() {
                shared.record(id, ty, value.clone());
            }
        }));
        recorder.listener = Some(listener);
        recorder.sources = Some(sources);
        recorder
    }

    /// Recorder that keeps everything in memory, for tests and previews
    pub fn in_memory(codecs: Arc<CodecRegistry>) -> Self {
        Self::new(RecorderConfig::in_memory(), codecs)
    }

    /// The configuration this recorder was created with
    pub fn config(&self) -> &RecorderConfig {
        &self.shared.config
    }

    /// Start a new session
    ///
    /// Captures the current value of every registered source at time zero.
    /// Does nothing if already running.
    pub fn start(&self) -> Result<()> {
        let mut worker = lock(&self.worker);
        if self.shared.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let session = Arc::new(Session::new(&self.shared.config));
        if let Ok(mut current) = self.shared.session.write() {
            *current = Some(Arc::clone(&session));
        }

        if let Some(sources) = &self.sources {
            for source in sources.all() {
                if let Some(value) = source.current_value() {
                    session
                        .buffer
                        .append(Sample::new(source.id(), source.data_type(), value, 0));
                }
            }
        }

        if session.file.is_some() {
            *worker = Some(FlushWorker::spawn(&self.shared, Arc::clone(&session))?);
        }
        self.shared.running.store(true, Ordering::SeqCst);

        match &session.file {
            Some(file) => tracing::info!("Recording started, writing to {}", file.display()),
            None => tracing::info!("Recording started (in memory)"),
        }
        Ok(())
    }

    /// Stop the session, writing out anything still buffered
    ///
    /// New values are refused from here on, and values already being appended
    /// finish first. The periodic flush is cancelled, then one final flush runs
    /// on the calling thread unless `flush_on_stop` is off. Does nothing if
    /// stopped.
    pub fn stop(&self) -> Result<()> {
        let mut worker = lock(&self.worker);
        if !self.shared.halt() {
            return Ok(());
        }
        if let Some(worker) = worker.take() {
            worker.shutdown();
        }

        let session = self.shared.session();
        if self.shared.config.flush_on_stop {
            if let Some(session) = &session {
                session.flush(&self.shared.codecs)?;
            }
        }

        let stats = session.map(|s| s.buffer.session_stats()).unwrap_or_default();
        tracing::info!(
            "Recording stopped ({} samples, {} markers, {} ms)",
            stats.sample_count,
            stats.marker_count,
            stats.length()
        );
        Ok(())
    }

    /// Stop the current session and start a fresh one
    pub fn reset(&self) -> Result<()> {
        if let Err(e) = self.stop() {
            tracing::warn!("Final flush before reset failed: {}", e);
        }
        self.start()
    }

    /// Write buffered data now instead of waiting for the next periodic flush
    pub fn flush(&self) -> Result<Option<WriteSummary>> {
        match self.shared.session() {
            Some(session) => session.flush(&self.shared.codecs),
            None => Ok(None),
        }
    }

    /// Whether a session is running
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Record a value, timestamped relative to the session start
    ///
    /// Ignored while stopped.
    pub fn record(&self, source_id: &str, data_type: &str, value: Value) {
        self.shared.record(source_id, data_type, value);
    }

    /// Record the current value of `source`, if it has one
    pub fn record_current_value(&self, source: &dyn DataSource) {
        if let Some(value) = source.current_value() {
            self.record(source.id(), source.data_type(), value);
        }
    }

    /// Add a marker at the current time; ignored while stopped
    pub fn add_marker(&self, name: &str, description: &str, importance: MarkerImportance) {
        self.shared.add_marker(name, description, importance);
    }

    /// Add a marker, resolving the importance from its name
    pub fn add_marker_named(&self, name: &str, description: &str, importance: &str) -> Result<()> {
        let importance = importance.parse::<MarkerImportance>().map_err(|_| {
            RecordingError::malformed(format!("unknown marker importance '{}'", importance))
        })?;
        self.add_marker(name, description, importance);
        Ok(())
    }

    /// File of the current or last session; `None` for in-memory recorders
    pub fn recording_file(&self) -> Option<PathBuf> {
        self.shared.session()?.file.clone()
    }

    /// Buffer of the current or last session
    pub fn buffer(&self) -> Option<Arc<RecordingBuffer>> {
        self.shared.session().map(|s| Arc::clone(&s.buffer))
    }

    /// Current state
    pub fn status(&self) -> RecorderStatus {
        let session = self.shared.session();
        RecorderStatus {
            running: self.is_running(),
            file: session.as_ref().and_then(|s| s.file.clone()),
            started_at: session.as_ref().map(|s| s.started_at),
            stats: session
                .as_ref()
                .map(|s| s.buffer.session_stats())
                .unwrap_or_default(),
            pending_samples: session.as_ref().map(|s| s.buffer.len()).unwrap_or(0),
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let (Some(sources), Some(listener)) = (&self.sources, self.listener) {
            sources.unsubscribe(listener);
        }
        if let Err(e) = self.stop() {
            tracing::warn!("Final recording flush failed: {}", e);
        }
    }
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("running", &self.is_running())
            .field("file", &self.recording_file())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::LiveSource;

    fn codecs() -> Arc<CodecRegistry> {
        Arc::new(CodecRegistry::default())
    }

    #[test]
    fn test_record_ignored_while_stopped() {
        let recorder = Recorder::in_memory(codecs());
        recorder.record("/a", "Number", Value::Number(1.0));
        recorder.add_marker("m", "", MarkerImportance::Normal);
        assert!(recorder.buffer().is_none());

        recorder.start().unwrap();
        recorder.stop().unwrap();
        recorder.record("/a", "Number", Value::Number(1.0));
        assert!(recorder.buffer().unwrap().is_empty());
    }

    #[test]
    fn test_in_memory_session() {
        let recorder = Recorder::in_memory(codecs());
        recorder.start().unwrap();
        assert!(recorder.is_running());
        assert!(recorder.recording_file().is_none());

        recorder.record("/a", "Number", Value::Number(1.0));
        recorder.add_marker("Auto Start", "", MarkerImportance::High);
        recorder.add_marker_named("Note", "checked", "low").unwrap();
        recorder.stop().unwrap();

        let snapshot = recorder.buffer().unwrap().take_snapshot_and_clear();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.markers().len(), 2);
        assert_eq!(snapshot.markers()[1].importance(), MarkerImportance::Low);
        assert_eq!(recorder.flush().unwrap(), None);
    }

    #[test]
    fn test_unknown_importance_name() {
        let recorder = Recorder::in_memory(codecs());
        recorder.start().unwrap();
        assert!(recorder.add_marker_named("x", "", "urgent").is_err());
    }

    #[test]
    fn test_start_captures_initial_values() {
        let sources = Arc::new(SourceRegistry::new());
        sources.register(Arc::new(LiveSource::with_value("/battery", Value::Number(12.4))));
        sources.register(Arc::new(LiveSource::new("/empty", "Number")));

        let recorder = Recorder::with_sources(RecorderConfig::in_memory(), codecs(), sources);
        recorder.start().unwrap();
        let snapshot = recorder.buffer().unwrap().take_snapshot_and_clear();
        assert_eq!(
            snapshot.samples(),
            &[Sample::new("/battery", "Number", Value::Number(12.4), 0)]
        );
    }

    #[test]
    fn test_published_values_are_recorded() {
        let sources = Arc::new(SourceRegistry::new());
        let recorder =
            Recorder::with_sources(RecorderConfig::in_memory(), codecs(), Arc::clone(&sources));
        sources.publish("/before", Value::Boolean(true));

        recorder.start().unwrap();
        sources.publish("/speed", Value::Number(2.0));
        let snapshot = recorder.buffer().unwrap().take_snapshot_and_clear();

        // "/before" is captured once as an initial value
        let ids: Vec<&str> = snapshot.samples().iter().map(|s| s.source_id()).collect();
        assert_eq!(ids, vec!["/before", "/speed"]);
    }

    #[test]
    fn test_start_twice_keeps_session() {
        let recorder = Recorder::in_memory(codecs());
        recorder.start().unwrap();
        recorder.record("/a", "Number", Value::Number(1.0));
        recorder.start().unwrap();
        assert_eq!(recorder.buffer().unwrap().len(), 1);

        recorder.reset().unwrap();
        assert!(recorder.is_running());
        assert!(recorder.buffer().unwrap().is_empty());
    }

    #[test]
    fn test_stop_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = RecorderConfig {
            flush_interval_ms: 60_000,
            ..RecorderConfig::with_dir(dir.path())
        };
        let recorder = Recorder::new(config, codecs());
        recorder.start().unwrap();
        recorder.record("/a", "Number", Value::Number(1.0));
        recorder.stop().unwrap();

        let file = recorder.recording_file().unwrap();
        assert!(file.starts_with(dir.path()));
        let loaded = crate::serialization::load_recording(&file, &CodecRegistry::default()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(recorder.status().pending_samples, 0);
    }
}
