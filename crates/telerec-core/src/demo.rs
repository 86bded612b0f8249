//! Demo Mode - Simulated robot telemetry generator
//!
//! Generates plausible robot telemetry for trying out the recorder and
//! playback without a robot. Simulates a match (pre-match disabled,
//! autonomous, teleop, end) with a drivetrain that follows random drive
//! commands and a battery that sags under load.

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

use crate::codec::Value;
use crate::recording::{Marker, MarkerImportance, Recording, Sample};
use crate::recorder::Recorder;
use crate::source::SourceRegistry;

/// Source IDs produced by the simulator
pub mod ids {
    /// Current match phase name (String)
    pub const MATCH_PHASE: &str = "/FMSInfo/MatchPhase";
    /// Whether the robot is enabled (Boolean)
    pub const ENABLED: &str = "/FMSInfo/Enabled";
    /// Left drivetrain speed in m/s (Number)
    pub const LEFT_SPEED: &str = "/SmartDashboard/Drive/LeftSpeed";
    /// Right drivetrain speed in m/s (Number)
    pub const RIGHT_SPEED: &str = "/SmartDashboard/Drive/RightSpeed";
    /// Field pose `[x, y, heading]` (NumberArray)
    pub const POSE: &str = "/SmartDashboard/Drive/Pose";
    /// Battery voltage (Number)
    pub const BATTERY: &str = "/SmartDashboard/Battery";
    /// Intake beam breaks (BooleanArray)
    pub const INTAKE_SENSORS: &str = "/SmartDashboard/Intake/Sensors";
}

/// Phase of a simulated match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    /// Before the match starts
    Disabled,
    /// Autonomous period
    Autonomous,
    /// Driver-controlled period
    Teleop,
    /// After the match
    Ended,
}

impl MatchPhase {
    /// Display name
    pub fn name(self) -> &'static str {
        match self {
            MatchPhase::Disabled => "Disabled",
            MatchPhase::Autonomous => "Autonomous",
            MatchPhase::Teleop => "Teleop",
            MatchPhase::Ended => "Ended",
        }
    }

    fn enabled(self) -> bool {
        matches!(self, MatchPhase::Autonomous | MatchPhase::Teleop)
    }
}

/// Phase lengths in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchTiming {
    /// Time disabled before autonomous
    pub disabled_ms: u64,
    /// Autonomous length
    pub auto_ms: u64,
    /// Teleop length
    pub teleop_ms: u64,
}

impl Default for MatchTiming {
    fn default() -> Self {
        Self {
            disabled_ms: 2_000,
            auto_ms: 15_000,
            teleop_ms: 135_000,
        }
    }
}

impl MatchTiming {
    /// Squeeze a whole match into `total_ms`, keeping the usual proportions
    pub fn compressed(total_ms: u64) -> Self {
        let default = Self::default();
        let full = default.disabled_ms + default.auto_ms + default.teleop_ms;
        let scale = |ms: u64| ms * total_ms / full;
        Self {
            disabled_ms: scale(default.disabled_ms),
            auto_ms: scale(default.auto_ms).max(1),
            teleop_ms: scale(default.teleop_ms).max(1),
        }
    }

    fn phase_at(&self, ms: u64) -> MatchPhase {
        if ms < self.disabled_ms {
            MatchPhase::Disabled
        } else if ms < self.disabled_ms + self.auto_ms {
            MatchPhase::Autonomous
        } else if ms < self.disabled_ms + self.auto_ms + self.teleop_ms {
            MatchPhase::Teleop
        } else {
            MatchPhase::Ended
        }
    }
}

/// Telemetry produced by one simulation step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DemoFrame {
    /// `(source_id, value)` pairs that changed this step
    pub values: Vec<(String, Value)>,
    /// Events that happened this step
    pub markers: Vec<(String, String, MarkerImportance)>,
}

/// Simulated robot
pub struct DemoRobot {
    timing: MatchTiming,
    /// Time of the first update (ms)
    start_ms: Option<u64>,
    /// Last update time, relative to start (ms)
    last_ms: u64,
    phase: Option<MatchPhase>,
    /// Commanded wheel speeds (m/s)
    command: (f64, f64),
    /// Actual wheel speeds (m/s), lagging the command
    speeds: (f64, f64),
    /// Time of the next command change (ms from start)
    next_command_at_ms: u64,
    pose: [f64; 3],
    battery: f64,
    browned_out: bool,
    rng: StdRng,
}

impl Default for DemoRobot {
    fn default() -> Self {
        Self::new()
    }
}

const TRACK_WIDTH_M: f64 = 0.6;
const MAX_SPEED: f64 = 4.0;
const NOMINAL_VOLTAGE: f64 = 12.6;
const BROWNOUT_VOLTAGE: f64 = 7.0;

impl DemoRobot {
    /// Create a simulator with a random seed and full-length match
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy(), MatchTiming::default())
    }

    /// Create a reproducible simulator
    pub fn with_seed(seed: u64, timing: MatchTiming) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), timing)
    }

    fn with_rng(rng: StdRng, timing: MatchTiming) -> Self {
        Self {
            timing,
            start_ms: None,
            last_ms: 0,
            phase: None,
            command: (0.0, 0.0),
            speeds: (0.0, 0.0),
            next_command_at_ms: 0,
            pose: [1.5, 4.0, 0.0],
            battery: NOMINAL_VOLTAGE,
            browned_out: false,
            rng,
        }
    }

    /// Current match phase
    pub fn phase(&self) -> MatchPhase {
        self.phase.unwrap_or(MatchPhase::Disabled)
    }

    /// Advance the simulation to `elapsed_ms` and report what changed
    pub fn update(&mut self, elapsed_ms: u64) -> DemoFrame {
        let start = *self.start_ms.get_or_insert(elapsed_ms);
        let sim_time = elapsed_ms.saturating_sub(start);
        let dt = sim_time.saturating_sub(self.last_ms) as f64 / 1000.0;
        self.last_ms = sim_time;

        let mut frame = DemoFrame::default();
        let phase = self.timing.phase_at(sim_time);
        if self.phase != Some(phase) {
            self.enter_phase(phase, &mut frame);
        }

        if phase.enabled() && sim_time >= self.next_command_at_ms {
            self.command = self.random_command(phase);
            self.next_command_at_ms = sim_time + self.rng.gen_range(500..2500);
        } else if !phase.enabled() {
            self.command = (0.0, 0.0);
        }

        // First-order lag toward the commanded speeds
        let alpha = (dt * 4.0).min(1.0);
        self.speeds.0 += (self.command.0 - self.speeds.0) * alpha;
        self.speeds.1 += (self.command.1 - self.speeds.1) * alpha;

        let linear = (self.speeds.0 + self.speeds.1) / 2.0;
        let angular = (self.speeds.1 - self.speeds.0) / TRACK_WIDTH_M;
        self.pose[2] = (self.pose[2] + angular * dt).rem_euclid(std::f64::consts::TAU);
        self.pose[0] = (self.pose[0] + linear * self.pose[2].cos() * dt).clamp(0.0, 16.5);
        self.pose[1] = (self.pose[1] + linear * self.pose[2].sin() * dt).clamp(0.0, 8.2);

        // Voltage sags with current draw and slowly discharges
        let load = (self.speeds.0.abs() + self.speeds.1.abs()) / (2.0 * MAX_SPEED);
        let resting = NOMINAL_VOLTAGE - 0.6 * (sim_time as f64 / 150_000.0);
        let ripple = self.rng.gen_range(-0.05..0.05);
        self.battery = (resting - 5.5 * load + ripple).max(5.0);
        if self.battery < BROWNOUT_VOLTAGE && !self.browned_out {
            self.browned_out = true;
            frame.markers.push((
                "Brownout".to_string(),
                format!("Battery dropped to {:.2} V", self.battery),
                MarkerImportance::Critical,
            ));
        } else if self.battery > BROWNOUT_VOLTAGE + 0.5 {
            self.browned_out = false;
        }

        let intake: Vec<bool> = (0..3).map(|_| self.rng.gen_bool(0.1)).collect();

        frame.values.extend([
            (ids::LEFT_SPEED.to_string(), Value::Number(self.speeds.0)),
            (ids::RIGHT_SPEED.to_string(), Value::Number(self.speeds.1)),
            (ids::POSE.to_string(), Value::NumberArray(self.pose.to_vec())),
            (ids::BATTERY.to_string(), Value::Number(self.battery)),
            (ids::INTAKE_SENSORS.to_string(), Value::BooleanArray(intake)),
        ]);
        frame
    }

    fn enter_phase(&mut self, phase: MatchPhase, frame: &mut DemoFrame) {
        let marker = match phase {
            MatchPhase::Disabled => None,
            MatchPhase::Autonomous => Some(("Auto Start", MarkerImportance::Normal)),
            MatchPhase::Teleop => Some(("Teleop Start", MarkerImportance::Normal)),
            MatchPhase::Ended => Some(("Match End", MarkerImportance::High)),
        };
        if let Some((name, importance)) = marker {
            frame
                .markers
                .push((name.to_string(), String::new(), importance));
        }
        frame
            .values
            .push((ids::MATCH_PHASE.to_string(), Value::from(phase.name())));
        frame
            .values
            .push((ids::ENABLED.to_string(), Value::Boolean(phase.enabled())));
        self.phase = Some(phase);
    }

    fn random_command(&mut self, phase: MatchPhase) -> (f64, f64) {
        // Autonomous drives smooth arcs, teleop is more erratic
        let (speed, turn) = match phase {
            MatchPhase::Autonomous => (self.rng.gen_range(1.0..3.0), self.rng.gen_range(-0.5..0.5)),
            _ => (
                self.rng.gen_range(-MAX_SPEED..MAX_SPEED),
                self.rng.gen_range(-1.5..1.5),
            ),
        };
        (
            (speed - turn).clamp(-MAX_SPEED, MAX_SPEED),
            (speed + turn).clamp(-MAX_SPEED, MAX_SPEED),
        )
    }

    /// Publish one step into live sources and add its markers to `recorder`
    pub fn publish(&mut self, elapsed_ms: u64, sources: &SourceRegistry, recorder: &Recorder) {
        let frame = self.update(elapsed_ms);
        for (id, value) in frame.values {
            sources.publish(&id, value);
        }
        for (name, description, importance) in frame.markers {
            recorder.add_marker(&name, &description, importance);
        }
    }

    /// Simulate `duration_ms` at a fixed `period_ms` straight into a recording
    pub fn generate(&mut self, duration_ms: u64, period_ms: u64) -> Recording {
        let mut recording = Recording::new();
        let period = period_ms.max(1);
        let mut t = 0;
        while t <= duration_ms {
            let frame = self.update(t);
            let ts = t as i64;
            for (id, value) in frame.values {
                recording.append(Sample::of(id, value, ts));
            }
            for (name, description, importance) in frame.markers {
                recording.add_marker(Marker::new(name, description, importance, ts));
            }
            t += period;
        }
        recording
    }
}
