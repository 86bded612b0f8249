//! telerec - record, inspect, export and replay telemetry recordings

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use telerec_core::codec::CodecRegistry;
use telerec_core::config::RecorderConfig;
use telerec_core::demo::{DemoRobot, MatchTiming};
use telerec_core::export::{export_csv, ExportSettings};
use telerec_core::playback::{Playback, PlaybackStatus};
use telerec_core::recorder::Recorder;
use telerec_core::serialization::{inspect_recording, load_recording};
use telerec_core::source::{LiveSource, SourceRegistry};

/// Telemetry recorder for robot dashboards
#[derive(Parser)]
#[command(name = "telerec")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Recorder config file (JSON)
    #[arg(long, global = true, env = "TELEREC_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a session
    Record(RecordArgs),
    /// Show the structure and contents summary of a recording file
    Info {
        /// Recording file
        file: PathBuf,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Convert a recording to CSV
    Export {
        /// Recording file
        file: PathBuf,
        /// Output file (defaults to the input with a .csv extension)
        #[arg(long, short)]
        out: Option<PathBuf>,
        /// Include dashboard metadata sources
        #[arg(long)]
        metadata: bool,
        /// Collation window in milliseconds
        #[arg(long, default_value_t = telerec_core::export::DEFAULT_WINDOW_MS)]
        window_ms: i64,
    },
    /// Replay a recording at its original pace
    Play {
        /// Recording file
        file: PathBuf,
        /// Start over after the last frame
        #[arg(long = "loop")]
        looping: bool,
        /// Stop after this many seconds (required to end a looping playback)
        #[arg(long)]
        seconds: Option<u64>,
    },
}

#[derive(Args, Debug)]
struct RecordArgs {
    /// Record telemetry from the simulated robot
    #[arg(long)]
    demo: bool,
    /// Session length in seconds
    #[arg(long, default_value_t = 20)]
    seconds: u64,
    /// Recordings directory (overrides the config file)
    #[arg(long)]
    dir: Option<PathBuf>,
    /// Simulation step in milliseconds
    #[arg(long, default_value_t = 20)]
    period_ms: u64,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("telerec={0},telerec_core={0}", level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<RecorderConfig> {
    match path {
        Some(path) => RecorderConfig::load(path)
            .with_context(|| format!("Failed to read config {}", path.display())),
        None => Ok(RecorderConfig::default()),
    }
}

fn record(args: RecordArgs, mut config: RecorderConfig) -> Result<()> {
    if !args.demo {
        bail!("no live telemetry transport is available; use --demo to record the simulated robot");
    }
    if let Some(dir) = args.dir {
        config.recordings_dir = dir;
    }

    let codecs = Arc::new(CodecRegistry::default());
    let sources = Arc::new(SourceRegistry::new());
    let recorder = Recorder::with_sources(config, codecs, Arc::clone(&sources));
    let duration = Duration::from_secs(args.seconds);
    let mut robot = DemoRobot::with_seed(
        rand_seed(),
        MatchTiming::compressed(duration.as_millis() as u64),
    );

    recorder.start().context("Failed to start recording")?;
    let started = Instant::now();
    let period = Duration::from_millis(args.period_ms.max(1));
    while started.elapsed() < duration {
        robot.publish(started.elapsed().as_millis() as u64, &sources, &recorder);
        thread::sleep(period);
    }
    recorder.stop().context("Failed to write the end of the recording")?;

    let status = recorder.status();
    match status.file {
        Some(file) => println!(
            "Recorded {} samples and {} markers to {}",
            status.stats.sample_count,
            status.stats.marker_count,
            file.display()
        ),
        None => println!("Recorded {} samples in memory", status.stats.sample_count),
    }
    Ok(())
}

fn rand_seed() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[derive(Serialize)]
struct InfoReport {
    file: PathBuf,
    bytes: u64,
    version: u32,
    samples: usize,
    length_ms: i64,
    sources: Vec<String>,
    data_types: Vec<String>,
    markers: Vec<MarkerReport>,
}

#[derive(Serialize)]
struct MarkerReport {
    timestamp: i64,
    name: String,
    description: String,
    importance: String,
}

fn info(file: &Path, json: bool) -> Result<()> {
    let structure =
        inspect_recording(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let recording = load_recording(file, &CodecRegistry::default())
        .with_context(|| format!("Failed to load {}", file.display()))?;

    let sources: Vec<String> = recording.source_ids().into_iter().map(String::from).collect();
    let data_types: Vec<String> = structure
        .pool
        .iter()
        .filter(|entry| !recording.contains_source(entry))
        .cloned()
        .collect();
    let report = InfoReport {
        file: file.to_path_buf(),
        bytes: structure.file_len,
        version: structure.header.version,
        samples: recording.len(),
        length_ms: recording.length(),
        sources,
        data_types,
        markers: recording
            .markers()
            .iter()
            .map(|m| MarkerReport {
                timestamp: m.timestamp(),
                name: m.name().to_string(),
                description: m.description().to_string(),
                importance: m.importance().name().to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("File:       {} ({} bytes)", report.file.display(), report.bytes);
    println!("Version:    {}", report.version);
    println!("Samples:    {}", report.samples);
    println!("Length:     {:.3} s", report.length_ms as f64 / 1000.0);
    println!("Data types: {}", report.data_types.join(", "));
    println!("Sources ({}):", report.sources.len());
    for source in &report.sources {
        println!("  {}", source);
    }
    println!("Markers ({}):", report.markers.len());
    for marker in &report.markers {
        println!(
            "  {:>8} ms  {:<8}  {}{}",
            marker.timestamp,
            marker.importance,
            marker.name,
            if marker.description.is_empty() {
                String::new()
            } else {
                format!(" - {}", marker.description)
            }
        );
    }
    Ok(())
}

fn export(file: &Path, out: Option<PathBuf>, settings: ExportSettings) -> Result<()> {
    let recording = load_recording(file, &CodecRegistry::default())
        .with_context(|| format!("Failed to load {}", file.display()))?;
    let out = out.unwrap_or_else(|| file.with_extension("csv"));
    export_csv(&out, &recording, &settings)
        .with_context(|| format!("Failed to write {}", out.display()))?;
    println!("Exported {} samples to {}", recording.len(), out.display());
    Ok(())
}

fn play(file: &Path, looping: bool, seconds: Option<u64>) -> Result<()> {
    if looping && seconds.is_none() {
        bail!("--loop needs --seconds to know when to stop");
    }
    let codecs = CodecRegistry::default();
    let sources = Arc::new(SourceRegistry::new());
    let playback = Playback::load(file, &codecs, Arc::clone(&sources))
        .with_context(|| format!("Failed to load {}", file.display()))?;
    for id in playback.recording().source_ids() {
        let data_type = playback
            .recording()
            .samples()
            .iter()
            .find(|s| s.source_id() == id)
            .map(|s| s.data_type().to_string())
            .unwrap_or_default();
        sources.register(Arc::new(LiveSource::new(id, data_type)));
    }

    playback.set_looping(looping);
    playback.start()?;
    let started = Instant::now();
    let limit = seconds.map(Duration::from_secs);
    let mut last_report = Instant::now();
    while playback.status() != PlaybackStatus::Finished {
        if limit.is_some_and(|limit| started.elapsed() >= limit) {
            break;
        }
        if last_report.elapsed() >= Duration::from_secs(1) {
            if let Some(frame) = playback.current_frame() {
                tracing::info!(
                    "[{:>6} / {}] t={} ms  {} = {}",
                    playback.frame(),
                    playback.max_frame(),
                    frame.timestamp(),
                    frame.source_id(),
                    frame.value()
                );
            }
            last_report = Instant::now();
        }
        thread::sleep(Duration::from_millis(20));
    }
    playback.stop();
    println!(
        "Played {} of {} frames in {:.1} s",
        playback.frame() + 1,
        playback.frame_count(),
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    match cli.command {
        Commands::Record(args) => {
            let config = load_config(cli.global.config.as_deref())?;
            record(args, config)
        }
        Commands::Info { file, json } => info(&file, json),
        Commands::Export {
            file,
            out,
            metadata,
            window_ms,
        } => export(
            &file,
            out,
            ExportSettings {
                include_metadata: metadata,
                window_ms,
            },
        ),
        Commands::Play {
            file,
            looping,
            seconds,
        } => play(&file, looping, seconds),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_play_loop() {
        let cli = Cli::parse_from(["telerec", "play", "run.rec", "--loop", "--seconds", "5"]);
        match cli.command {
            Commands::Play {
                looping, seconds, ..
            } => {
                assert!(looping);
                assert_eq!(seconds, Some(5));
            }
            _ => panic!("expected play"),
        }
    }

    #[test]
    fn test_parse_record_defaults() {
        let cli = Cli::parse_from(["telerec", "record", "--demo"]);
        match cli.command {
            Commands::Record(args) => {
                assert!(args.demo);
                assert_eq!(args.seconds, 20);
                assert!(args.dir.is_none());
            }
            _ => panic!("expected record"),
        }
    }
}
