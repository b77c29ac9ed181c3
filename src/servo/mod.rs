// Servo control module
//
// Provides:
// - Angle to duty-cycle mapping (calibration)
// - PWM output seam with simulated and Firmata backends
// - Motion controller (smooth move, sweep, oscillate, sequence, calibrate)

mod controller;
mod error;
pub mod firmata;
pub mod mapper;
pub mod pwm;

pub use controller::{MotorState, ServoController};
pub use error::ServoError;
pub use firmata::FirmataPwm;
pub use mapper::{Calibration, clamp_angle, map_angle_to_duty};
pub use pwm::{Delay, PwmError, PwmSink, SimulatedPwm, ThreadDelay};
