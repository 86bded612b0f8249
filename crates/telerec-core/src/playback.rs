//! Recording playback
//!
//! Replays a loaded recording into a [`SourceRegistry`] at the pace it was
//! recorded. A scheduling thread applies one frame (sample) at a time,
//! sleeping for the timestamp gap between consecutive frames. All waits are
//! on a condition variable, so pausing, seeking or stopping takes effect
//! immediately instead of after the current gap.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::codec::CodecRegistry;
use crate::error::{RecordingError, Result};
use crate::recording::{Recording, Sample};
use crate::serialization::load_recording;
use crate::source::SourceRegistry;

/// Observable playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    /// Not advancing; the initial state after loading
    Paused,
    /// Advancing through frames
    Playing,
    /// At the last frame with looping off
    Finished,
}

#[derive(Debug)]
struct PlayState {
    frame: usize,
    paused: bool,
    looping: bool,
    started: bool,
    stopping: bool,
    /// Bumped on every pause, unpause, seek or stop so an in-progress gap wait restarts
    generation: u64,
}

#[derive(Debug)]
struct Shared {
    recording: Recording,
    sources: Arc<SourceRegistry>,
    state: Mutex<PlayState>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PlayState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn max_frame(&self) -> usize {
        self.recording.len().saturating_sub(1)
    }

    /// Whether autoplay wraps from the last frame back to frame 0
    ///
    /// A recording that spans no time has nothing to pace a loop with, so it
    /// holds at its last frame even with looping on.
    fn wraps(&self, state: &PlayState) -> bool {
        state.looping && self.recording.length() > 0
    }

    /// Whether autoplay has nothing left to advance
    fn at_end(&self, state: &PlayState) -> bool {
        state.frame >= self.max_frame() && !self.wraps(state)
    }

    fn apply(&self, sample: &Sample) {
        self.sources
            .apply_recorded(sample.source_id(), sample.value().clone());
    }

    /// Bring every source to its latest value at or before `frame`
    fn apply_state_at(&self, frame: usize) {
        let samples = self.recording.samples();
        let mut remaining: HashSet<&str> = self.recording.source_ids().into_iter().collect();
        for sample in samples[..=frame].iter().rev() {
            if remaining.is_empty() {
                break;
            }
            if remaining.remove(sample.source_id()) {
                self.apply(sample);
            }
        }
    }

    /// Move to `frame`, pausing autoplay
    fn seek(&self, state: &mut PlayState, frame: usize) {
        state.paused = true;
        state.generation += 1;
        let previous = state.frame;
        state.frame = frame;
        if frame == previous + 1 {
            self.apply(&self.recording.samples()[frame]);
        } else {
            self.apply_state_at(frame);
        }
        self.wake.notify_all();
    }

    /// Scheduling loop run on the playback thread
    fn run(&self) {
        let samples = self.recording.samples();
        let max_frame = self.max_frame();
        let mut state = self.lock();
        loop {
            if state.stopping {
                break;
            }
            if state.paused || self.at_end(&state) {
                state = self
                    .wake
                    .wait(state)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                continue;
            }

            let current = state.frame;
            if current == max_frame {
                // Wrap around without waiting
                state.frame = 0;
                self.apply(&samples[0]);
                drop(state);
                state = self.lock();
                continue;
            }

            let next = current + 1;
            let gap = samples[next].timestamp() - samples[current].timestamp();
            let deadline = Instant::now() + Duration::from_millis(gap.max(0) as u64);
            let generation = state.generation;
            loop {
                let now = Instant::now();
                if now >= deadline || state.generation != generation || state.stopping {
                    break;
                }
                state = self
                    .wake
                    .wait_timeout(state, deadline - now)
                    .map(|(guard, _)| guard)
                    .unwrap_or_else(|poisoned| poisoned.into_inner().0);
            }
            if state.generation != generation || state.stopping {
                continue;
            }

            state.frame = next;
            self.apply(&samples[next]);
            // Zero gaps never wait, so let callers in between frames
            drop(state);
            state = self.lock();
        }
    }
}

/// Timed replay of a recording into live data sources
pub struct Playback {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Playback {
    /// Load the recording at `path` for playback into `sources`
    pub fn load(
        path: impl AsRef<Path>,
        codecs: &CodecRegistry,
        sources: Arc<SourceRegistry>,
    ) -> Result<Self> {
        let recording = load_recording(path, codecs)?;
        Ok(Self::from_recording(recording, sources))
    }

    /// Play back an in-memory recording
    pub fn from_recording(mut recording: Recording, sources: Arc<SourceRegistry>) -> Self {
        recording.sort();
        Self {
            shared: Arc::new(Shared {
                recording,
                sources,
                state: Mutex::new(PlayState {
                    frame: 0,
                    paused: true,
                    looping: false,
                    started: false,
                    stopping: false,
                    generation: 0,
                }),
                wake: Condvar::new(),
            }),
            thread: Mutex::new(None),
        }
    }

    /// Start playing from frame 0
    ///
    /// Live producers are disconnected until [`stop`](Self::stop). Calling
    /// this while already started does nothing.
    pub fn start(&self) -> Result<()> {
        if self.frame_count() == 0 {
            return Err(RecordingError::EmptyRecording);
        }
        let mut thread = self
            .thread
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if thread.is_some() {
            return Ok(());
        }

        self.shared.sources.disconnect();
        {
            let mut state = self.shared.lock();
            state.frame = 0;
            state.stopping = false;
            state.started = true;
            self.shared.apply(&self.shared.recording.samples()[0]);
        }

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("telerec-playback".into())
            .spawn(move || shared.run());
        match handle {
            Ok(handle) => *thread = Some(handle),
            Err(e) => {
                self.shared.lock().started = false;
                self.shared.sources.connect();
                return Err(e.into());
            }
        }

        self.unpause();
        tracing::info!("Playback started ({} frames)", self.frame_count());
        Ok(())
    }

    /// Stop playing and reconnect live producers
    ///
    /// The frame index stays where playback stopped. Does nothing if not started.
    pub fn stop(&self) {
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(handle) = handle else {
            return;
        };
        {
            let mut state = self.shared.lock();
            state.stopping = true;
            state.generation += 1;
            self.shared.wake.notify_all();
        }
        if handle.join().is_err() {
            tracing::warn!("Playback thread panicked");
        }
        {
            let mut state = self.shared.lock();
            state.stopping = false;
            state.started = false;
            state.paused = true;
        }
        self.shared.sources.connect();
        tracing::info!("Playback stopped at frame {}", self.frame());
    }

    /// Pause or resume autoplay
    pub fn set_paused(&self, paused: bool) {
        let mut state = self.shared.lock();
        if state.paused != paused {
            state.paused = paused;
            state.generation += 1;
        }
        self.shared.wake.notify_all();
    }

    /// Pause autoplay
    pub fn pause(&self) {
        self.set_paused(true);
    }

    /// Resume autoplay
    pub fn unpause(&self) {
        self.set_paused(false);
    }

    /// Whether autoplay is paused
    pub fn is_paused(&self) -> bool {
        self.shared.lock().paused
    }

    /// Enable or disable wrapping to frame 0 after the last frame
    pub fn set_looping(&self, looping: bool) {
        self.shared.lock().looping = looping;
        self.shared.wake.notify_all();
    }

    /// Whether playback wraps after the last frame
    pub fn is_looping(&self) -> bool {
        self.shared.lock().looping
    }

    /// Whether [`start`](Self::start) has been called without a matching stop
    pub fn is_started(&self) -> bool {
        self.shared.lock().started
    }

    /// Pause and step back one frame (stays at frame 0)
    pub fn previous_frame(&self) {
        let mut state = self.shared.lock();
        if self.frame_count() > 0 && state.frame > 0 {
            let frame = state.frame - 1;
            self.shared.seek(&mut state, frame);
        } else {
            state.paused = true;
            state.generation += 1;
            self.shared.wake.notify_all();
        }
    }

    /// Pause and step forward one frame (stays at the last frame)
    pub fn next_frame(&self) {
        let mut state = self.shared.lock();
        if state.frame < self.max_frame() {
            let frame = state.frame + 1;
            self.shared.seek(&mut state, frame);
        } else {
            state.paused = true;
            state.generation += 1;
            self.shared.wake.notify_all();
        }
    }

    /// Pause and jump to frame `frame`
    ///
    /// Every source is set to its latest value at or before the frame.
    pub fn set_frame(&self, frame: usize) -> Result<()> {
        if self.frame_count() == 0 {
            return Err(RecordingError::EmptyRecording);
        }
        if frame > self.max_frame() {
            return Err(RecordingError::FrameOutOfRange {
                frame,
                max: self.max_frame(),
            });
        }
        let mut state = self.shared.lock();
        self.shared.seek(&mut state, frame);
        Ok(())
    }

    /// Index of the current frame
    pub fn frame(&self) -> usize {
        self.shared.lock().frame
    }

    /// Number of frames (samples) in the recording
    pub fn frame_count(&self) -> usize {
        self.shared.recording.len()
    }

    /// Index of the last frame (0 for an empty recording)
    pub fn max_frame(&self) -> usize {
        self.shared.max_frame()
    }

    /// Sample at the current frame, or `None` for an empty recording
    pub fn current_frame(&self) -> Option<Sample> {
        let frame = self.frame();
        self.shared.recording.samples().get(frame).cloned()
    }

    /// Current playback state
    pub fn status(&self) -> PlaybackStatus {
        let state = self.shared.lock();
        if state.paused {
            PlaybackStatus::Paused
        } else if self.shared.at_end(&state) {
            PlaybackStatus::Finished
        } else {
            PlaybackStatus::Playing
        }
    }

    /// The recording being played
    pub fn recording(&self) -> &Recording {
        &self.shared.recording
    }
}

impl Drop for Playback {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Playback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Playback")
            .field("frames", &self.frame_count())
            .field("frame", &self.frame())
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Value;
    use crate::source::LiveSource;

    fn setup() -> (Playback, Arc<SourceRegistry>) {
        let sources = Arc::new(SourceRegistry::new());
        sources.register(Arc::new(LiveSource::new("/a", "Number")));
        sources.register(Arc::new(LiveSource::new("/b", "Number")));
        let recording = Recording::from_parts(
            vec![
                Sample::of("/a", Value::Number(1.0), 0),
                Sample::of("/b", Value::Number(10.0), 0),
                Sample::of("/a", Value::Number(2.0), 10),
                Sample::of("/a", Value::Number(3.0), 20),
                Sample::of("/b", Value::Number(30.0), 20),
            ],
            vec![],
        );
        (
            Playback::from_recording(recording, Arc::clone(&sources)),
            sources,
        )
    }

    fn value(sources: &SourceRegistry, id: &str) -> Option<Value> {
        sources.get(id).and_then(|s| s.current_value())
    }

    #[test]
    fn test_initial_state() {
        let (playback, _) = setup();
        assert_eq!(playback.frame(), 0);
        assert_eq!(playback.frame_count(), 5);
        assert_eq!(playback.max_frame(), 4);
        assert_eq!(playback.status(), PlaybackStatus::Paused);
        assert!(!playback.is_looping());
        assert_eq!(playback.current_frame().unwrap().timestamp(), 0);
    }

    #[test]
    fn test_set_frame_applies_latest_values() {
        let (playback, sources) = setup();
        playback.set_frame(3).unwrap();
        assert_eq!(value(&sources, "/a"), Some(Value::Number(3.0)));
        assert_eq!(value(&sources, "/b"), Some(Value::Number(10.0)));

        playback.set_frame(1).unwrap();
        assert_eq!(value(&sources, "/a"), Some(Value::Number(1.0)));
        assert!(playback.is_paused());
    }

    #[test]
    fn test_set_frame_out_of_range() {
        let (playback, _) = setup();
        let err = playback.set_frame(5).unwrap_err();
        assert!(matches!(err, RecordingError::FrameOutOfRange { frame: 5, max: 4 }));
        assert_eq!(playback.frame(), 0);
    }

    #[test]
    fn test_step_clamped() {
        let (playback, sources) = setup();
        playback.previous_frame();
        assert_eq!(playback.frame(), 0);

        playback.next_frame();
        playback.next_frame();
        assert_eq!(playback.frame(), 2);
        assert_eq!(value(&sources, "/a"), Some(Value::Number(2.0)));

        playback.set_frame(4).unwrap();
        playback.next_frame();
        assert_eq!(playback.frame(), 4);
        playback.previous_frame();
        assert_eq!(playback.frame(), 3);
    }

    #[test]
    fn test_empty_recording() {
        let playback =
            Playback::from_recording(Recording::new(), Arc::new(SourceRegistry::new()));
        assert!(matches!(playback.start(), Err(RecordingError::EmptyRecording)));
        assert!(matches!(playback.set_frame(0), Err(RecordingError::EmptyRecording)));
        assert!(playback.current_frame().is_none());
    }

    #[test]
    fn test_start_plays_to_end_and_reconnects() {
        let (playback, sources) = setup();
        playback.start().unwrap();
        assert!(!sources.is_connected());
        assert!(playback.is_started());

        let deadline = Instant::now() + Duration::from_secs(5);
        while playback.status() != PlaybackStatus::Finished && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(playback.status(), PlaybackStatus::Finished);
        assert_eq!(value(&sources, "/b"), Some(Value::Number(30.0)));

        playback.stop();
        assert!(sources.is_connected());
        assert_eq!(playback.frame(), 4);
        assert_eq!(playback.status(), PlaybackStatus::Paused);
    }

    #[test]
    fn test_drop_reconnects_sources() {
        let (playback, sources) = setup();
        playback.start().unwrap();
        drop(playback);
        assert!(sources.is_connected());
    }
}
