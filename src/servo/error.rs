// Error types for the servo motion stack

use super::pwm::PwmError;

/// Errors surfaced by the calibration, the duty mapper and the motion controller
#[derive(Debug, thiserror::Error)]
pub enum ServoError {
    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Servo controller is not initialized (already deinitialized)")]
    NotInitialized,

    #[error("PWM hardware fault: {0}")]
    HardwareFault(#[from] PwmError),
}

impl ServoError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        ServoError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    /// True for errors after which no further motion is possible
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ServoError::InvalidParameter { .. })
    }
}

pub type Result<T> = std::result::Result<T, ServoError>;
