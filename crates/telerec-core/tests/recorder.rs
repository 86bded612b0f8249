//! Tests for recorder sessions writing to disk

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use telerec_core::codec::{CodecRegistry, Value};
    use telerec_core::config::RecorderConfig;
    use telerec_core::demo::{DemoRobot, MatchTiming};
    use telerec_core::export::{to_csv_string, ExportSettings};
    use telerec_core::recorder::Recorder;
    use telerec_core::recording::MarkerImportance;
    use telerec_core::serialization::{inspect_recording, load_recording};
    use telerec_core::source::SourceRegistry;

    fn config(dir: &std::path::Path, flush_interval_ms: u64) -> RecorderConfig {
        RecorderConfig {
            flush_interval_ms,
            ..RecorderConfig::with_dir(dir)
        }
    }

    #[test]
    fn test_periodic_flushes_then_final_flush() {
        let dir = tempfile::tempdir().unwrap();
        let codecs = Arc::new(CodecRegistry::default());
        let recorder = Recorder::new(config(dir.path(), 30), Arc::clone(&codecs));
        recorder.start().unwrap();

        let file = recorder.recording_file().unwrap();
        assert!(file.starts_with(dir.path()));
        assert_eq!(file.extension().unwrap(), "rec");

        for i in 0..20 {
            recorder.record("/count", "Number", Value::Number(i as f64));
            thread::sleep(Duration::from_millis(10));
        }
        recorder.add_marker("Halfway", "", MarkerImportance::Low);

        // Wait for a periodic flush to create the file
        let deadline = Instant::now() + Duration::from_secs(5);
        while !file.exists() {
            assert!(Instant::now() < deadline, "no periodic flush happened");
            thread::sleep(Duration::from_millis(5));
        }

        recorder.record("/late", "Boolean", Value::Boolean(true));
        recorder.stop().unwrap();
        assert!(!recorder.is_running());

        let loaded = load_recording(&file, &codecs).unwrap();
        assert_eq!(loaded.len(), 21);
        assert_eq!(loaded.markers().len(), 1);
        assert_eq!(loaded.source_count(), 2);

        let status = recorder.status();
        assert_eq!(status.stats.sample_count, 21);
        assert_eq!(status.pending_samples, 0);
        assert_eq!(inspect_recording(&file).unwrap().header.data_count, 21);
    }

    #[test]
    fn test_stop_without_final_flush_keeps_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Recorder::new(
            RecorderConfig {
                flush_on_stop: false,
                ..config(dir.path(), 60_000)
            },
            Arc::new(CodecRegistry::default()),
        );
        recorder.start().unwrap();
        recorder.record("/a", "Number", Value::Number(1.0));
        recorder.stop().unwrap();

        assert!(!recorder.recording_file().unwrap().exists());
        assert_eq!(recorder.buffer().unwrap().len(), 1);
    }

    #[test]
    fn test_demo_match_through_sources() {
        let dir = tempfile::tempdir().unwrap();
        let codecs = Arc::new(CodecRegistry::default());
        let sources = Arc::new(SourceRegistry::new());
        let recorder =
            Recorder::with_sources(config(dir.path(), 50), Arc::clone(&codecs), Arc::clone(&sources));
        let mut robot = DemoRobot::with_seed(
            99,
            MatchTiming {
                disabled_ms: 20,
                auto_ms: 100,
                teleop_ms: 150,
            },
        );

        recorder.start().unwrap();
        let started = Instant::now();
        while started.elapsed() < Duration::from_millis(320) {
            robot.publish(started.elapsed().as_millis() as u64, &sources, &recorder);
            thread::sleep(Duration::from_millis(10));
        }
        recorder.stop().unwrap();

        let file = recorder.recording_file().unwrap();
        let loaded = load_recording(&file, &codecs).unwrap();
        let markers: Vec<&str> = loaded
            .markers()
            .iter()
            .map(|m| m.name())
            .filter(|n| *n != "Brownout")
            .collect();
        assert_eq!(markers, vec!["Auto Start", "Teleop Start", "Match End"]);
        assert!(loaded.contains_source("/SmartDashboard/Battery"));

        let csv = to_csv_string(&loaded, &ExportSettings::default());
        assert!(csv.starts_with("Timestamp,Event,Event Description,Event Severity,/FMSInfo/Enabled"));
        assert!(csv.contains("Auto Start"));
    }

    #[test]
    fn test_values_recorded_during_stop_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let codecs = Arc::new(CodecRegistry::default());

        for round in 0..10 {
            let recorder = Recorder::new(
                RecorderConfig {
                    file_name_format: format!("race-{}-${{time}}", round),
                    ..config(dir.path(), 60_000)
                },
                Arc::clone(&codecs),
            );
            recorder.start().unwrap();
            let producing = AtomicBool::new(true);

            thread::scope(|scope| {
                for t in 0..4 {
                    let recorder = &recorder;
                    let producing = &producing;
                    scope.spawn(move || {
                        let id = format!("/p{}", t);
                        let mut i = 0.0;
                        while producing.load(Ordering::SeqCst) {
                            recorder.record(&id, "Number", Value::Number(i));
                            i += 1.0;
                        }
                    });
                }
                thread::sleep(Duration::from_millis(5));
                recorder.stop().unwrap();
                producing.store(false, Ordering::SeqCst);
            });

            let buffer = recorder.buffer().unwrap();
            assert!(buffer.is_empty(), "round {}: samples left behind after stop", round);
            let file = recorder.recording_file().unwrap();
            let loaded = load_recording(&file, &codecs).unwrap();
            assert_eq!(loaded.len() as u64, buffer.session_stats().sample_count);
        }
    }

    #[test]
    fn test_reset_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let codecs = Arc::new(CodecRegistry::default());
        let recorder = Recorder::new(config(dir.path(), 60_000), Arc::clone(&codecs));

        recorder.start().unwrap();
        recorder.record("/first", "Number", Value::Number(1.0));
        let first = recorder.recording_file().unwrap();
        recorder.reset().unwrap();
        recorder.record("/second", "Number", Value::Number(2.0));
        let second = recorder.recording_file().unwrap();
        recorder.stop().unwrap();

        assert_ne!(first, second);
        let first = load_recording(&first, &codecs).unwrap();
        let second = load_recording(&second, &codecs).unwrap();
        assert!(first.contains_source("/first") && !first.contains_source("/second"));
        assert!(second.contains_source("/second") && !second.contains_source("/first"));
    }

    #[test]
    fn test_reset_starts_new_session() {
        let recorder = Recorder::in_memory(Arc::new(CodecRegistry::default()));
        recorder.start().unwrap();
        recorder.record("/a", "Number", Value::Number(1.0));
        let first = recorder.buffer().unwrap();

        recorder.reset().unwrap();
        let second = recorder.buffer().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert!(recorder.is_running());
    }
}
