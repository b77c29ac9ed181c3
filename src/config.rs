// Defaults, motion constants and command-line options
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::servo::{Calibration, ServoError};

// Servo calibration defaults (16-bit duty at 50 Hz)
pub const DEFAULT_PIN: u8 = 0;
pub const DEFAULT_MIN_DUTY: u16 = 1802; // 0°
pub const DEFAULT_MAX_DUTY: u16 = 7864; // 180°
pub const DEFAULT_FREQ_HZ: u32 = 50;

// Motion scaling used by sweep, sequence and calibrate
pub const DEFAULT_SPEED: f32 = 1.0;

// Interpolation granularity: a move takes roughly this many steps at speed 1.0
pub const STEP_GRANULARITY: f32 = 100.0;

// Pause between interpolation writes at speed 1.0
pub const BASE_STEP_DELAY: Duration = Duration::from_millis(10);

// Hold time per angle during calibration
pub const CALIBRATION_PAUSE: Duration = Duration::from_secs(1);

// Upper bound on the number of positions in one sweep
pub const MAX_SWEEP_STEPS: usize = 100_000;

// Upper bound on oscillation cycles in one call
pub const MAX_OSCILLATE_CYCLES: i32 = 10_000;

// Angles visited by calibrate when none are given
pub const DEFAULT_CALIBRATION_ANGLES: [f32; 5] = [0.0, 45.0, 90.0, 135.0, 180.0];

// Log filter when RUST_LOG is unset
pub const DEFAULT_LOG_FILTER: &str = "info";

// How often the menu checks the cancel flag while waiting for a key
pub const INPUT_POLL: Duration = Duration::from_millis(100);

/// Drive a hobby servo through smooth, scripted motions
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
pub struct Cli {
    /// PWM pin driving the servo
    #[arg(long, default_value_t = DEFAULT_PIN)]
    pub pin: u8,

    /// Duty at 0° (16-bit)
    #[arg(long, default_value_t = DEFAULT_MIN_DUTY)]
    pub min_duty: u16,

    /// Duty at 180° (16-bit)
    #[arg(long, default_value_t = DEFAULT_MAX_DUTY)]
    pub max_duty: u16,

    /// PWM frequency in Hz
    #[arg(long, default_value_t = DEFAULT_FREQ_HZ)]
    pub freq: u32,

    /// Default motion speed (scales step size and step delay)
    #[arg(long, default_value_t = DEFAULT_SPEED)]
    pub speed: f32,

    /// Serial port of a Firmata board; runs against a simulated output when omitted
    #[arg(long)]
    pub port: Option<String>,

    /// Serial baudrate for the Firmata link
    #[arg(long, default_value_t = crate::servo::firmata::DEFAULT_BAUDRATE)]
    pub baud: u32,

    /// JSON file with a list of motion commands to run instead of the menu
    #[arg(long)]
    pub script: Option<PathBuf>,
}

impl Cli {
    pub fn calibration(&self) -> Result<Calibration, ServoError> {
        Calibration::new(self.min_duty, self.max_duty, self.freq)
    }
}

/// Log filter from a RUST_LOG value, falling back to `DEFAULT_LOG_FILTER`
pub fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["servo-motion-runtime"]);
        assert_eq!(cli.pin, 0);
        assert_eq!(cli.speed, 1.0);
        assert!(cli.port.is_none());
        assert!(cli.script.is_none());
        assert_eq!(cli.calibration().unwrap(), Calibration::default());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "servo-motion-runtime",
            "--pin",
            "15",
            "--min-duty",
            "1000",
            "--max-duty",
            "2000",
            "--freq",
            "330",
            "--port",
            "/dev/ttyACM0",
        ]);
        let cal = cli.calibration().unwrap();
        assert_eq!(cli.pin, 15);
        assert_eq!(cal.min_duty(), 1000);
        assert_eq!(cal.max_duty(), 2000);
        assert_eq!(cal.pwm_frequency(), 330);
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyACM0"));
    }

    #[test]
    fn test_cli_inverted_calibration_rejected() {
        let cli = Cli::parse_from([
            "servo-motion-runtime",
            "--min-duty",
            "8000",
            "--max-duty",
            "2000",
        ]);
        assert!(cli.calibration().is_err());
    }

    #[test]
    fn test_log_filter_honours_rust_log() {
        use tracing_subscriber::filter::LevelFilter;

        assert_eq!(
            log_filter(Some("debug")).max_level_hint(),
            Some(LevelFilter::DEBUG)
        );
        assert_eq!(
            log_filter(Some("warn")).max_level_hint(),
            Some(LevelFilter::WARN)
        );
        assert_eq!(log_filter(None).max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(log_filter(Some("  ")).max_level_hint(), Some(LevelFilter::INFO));
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
