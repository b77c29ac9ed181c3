// Message types exchanged between the operator layer and the runtime

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of a single completed move
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoveReport {
    /// Angle actually commanded, after saturation
    pub angle: f32,
    pub duty: u16,
}

/// Motion request from the menu or a script file
///
/// Scripts are JSON arrays of these, e.g.
/// `[{"op": "move_to", "angle": 90}, {"op": "sweep", "start": 0, "end": 180, "step": 10}]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MotionCommand {
    MoveTo {
        angle: f32,
        /// Falls back to the runtime's default speed
        #[serde(default)]
        speed: Option<f32>,
    },
    Sweep {
        start: f32,
        end: f32,
        step: f32,
        #[serde(default)]
        delay_ms: u64,
    },
    Oscillate {
        center: f32,
        amplitude: f32,
        cycles: i32,
        #[serde(default)]
        speed: Option<f32>,
    },
    Sequence {
        angles: Vec<f32>,
        delays_ms: Vec<u64>,
    },
    Calibrate {
        /// Defaults to 0, 45, 90, 135 and 180°
        #[serde(default)]
        angles: Option<Vec<f32>>,
    },
    /// Report the current position without moving
    Status,
}

impl MotionCommand {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            MotionCommand::MoveTo { .. } => "move_to",
            MotionCommand::Sweep { .. } => "sweep",
            MotionCommand::Oscillate { .. } => "oscillate",
            MotionCommand::Sequence { .. } => "sequence",
            MotionCommand::Calibrate { .. } => "calibrate",
            MotionCommand::Status => "status",
        }
    }
}

pub(crate) fn millis(values: &[u64]) -> Vec<Duration> {
    values.iter().copied().map(Duration::from_millis).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_script() {
        let json = r#"[
            {"op": "move_to", "angle": 90},
            {"op": "move_to", "angle": 45, "speed": 2.5},
            {"op": "sweep", "start": 0, "end": 180, "step": 10},
            {"op": "oscillate", "center": 90, "amplitude": 30, "cycles": 5, "speed": 1.5},
            {"op": "sequence", "angles": [0, 90], "delays_ms": [500, 1000]},
            {"op": "calibrate"},
            {"op": "status"}
        ]"#;

        let commands: Vec<MotionCommand> = serde_json::from_str(json).unwrap();
        assert_eq!(commands.len(), 7);
        assert_eq!(
            commands[0],
            MotionCommand::MoveTo {
                angle: 90.0,
                speed: None
            }
        );
        assert_eq!(
            commands[2],
            MotionCommand::Sweep {
                start: 0.0,
                end: 180.0,
                step: 10.0,
                delay_ms: 0
            }
        );
        assert_eq!(commands[5], MotionCommand::Calibrate { angles: None });
        assert_eq!(commands[6], MotionCommand::Status);
        assert_eq!(commands[3].name(), "oscillate");
    }

    #[test]
    fn test_unknown_op_rejected() {
        let result = serde_json::from_str::<MotionCommand>(r#"{"op": "spin", "rpm": 60}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_report_serializes_flat() {
        let report = MoveReport {
            angle: 90.0,
            duty: 4833,
        };
        let json = serde_json::to_value(report).unwrap();
        assert_eq!(json, serde_json::json!({"angle": 90.0, "duty": 4833}));
    }

    #[test]
    fn test_millis() {
        assert_eq!(
            millis(&[500, 1000]),
            vec![Duration::from_millis(500), Duration::from_secs(1)]
        );
    }
}
