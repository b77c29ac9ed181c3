// Angle to duty-cycle mapping for a hobby servo
// Linear interpolation between the duty at 0° and the duty at 180°.

use super::error::{Result, ServoError};
use crate::config::{DEFAULT_FREQ_HZ, DEFAULT_MAX_DUTY, DEFAULT_MIN_DUTY};

/// Full mechanical travel of the servo in degrees
pub const MAX_ANGLE: f32 = 180.0;

/// Calibration tying the servo's travel limits to duty-cycle values
///
/// Duty values are 16-bit counts (0..=65535), so any `u16` pair with
/// `min_duty < max_duty` is a valid calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    min_duty: u16,
    max_duty: u16,
    pwm_frequency: u32,
}

impl Calibration {
    pub fn new(min_duty: u16, max_duty: u16, pwm_frequency: u32) -> Result<Self> {
        if min_duty >= max_duty {
            return Err(ServoError::invalid(
                "min_duty",
                format!("must be below max_duty ({} >= {})", min_duty, max_duty),
            ));
        }
        if pwm_frequency == 0 {
            return Err(ServoError::invalid("pwm_frequency", "must be non-zero"));
        }

        Ok(Self {
            min_duty,
            max_duty,
            pwm_frequency,
        })
    }

    /// Duty at 0°
    pub fn min_duty(&self) -> u16 {
        self.min_duty
    }

    /// Duty at 180°
    pub fn max_duty(&self) -> u16 {
        self.max_duty
    }

    pub fn pwm_frequency(&self) -> u32 {
        self.pwm_frequency
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            min_duty: DEFAULT_MIN_DUTY,
            max_duty: DEFAULT_MAX_DUTY,
            pwm_frequency: DEFAULT_FREQ_HZ,
        }
    }
}

/// Saturate an angle into [0, 180]. NaN maps to 0°.
pub fn clamp_angle(angle: f32) -> f32 {
    if angle.is_nan() {
        return 0.0;
    }
    angle.clamp(0.0, MAX_ANGLE)
}

/// Map an angle to a duty value within the calibration range
///
/// Out-of-range angles saturate, the result is truncated toward zero and
/// always lies in `[min_duty, max_duty]`.
pub fn map_angle_to_duty(angle: f32, calibration: &Calibration) -> u16 {
    let angle = clamp_angle(angle) as f64;
    let span = (calibration.max_duty - calibration.min_duty) as f64;
    let duty = calibration.min_duty as f64 + (angle / MAX_ANGLE as f64) * span;

    // Float rounding can never push past max_duty, but keep the bound explicit
    (duty as u16).clamp(calibration.min_duty, calibration.max_duty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_match_calibration() {
        let cal = Calibration::default();
        assert_eq!(map_angle_to_duty(0.0, &cal), 1802);
        assert_eq!(map_angle_to_duty(180.0, &cal), 7864);
    }

    #[test]
    fn test_midpoint_truncates() {
        let cal = Calibration::default();
        // 1802 + 0.5 * 6062 = 4833
        assert_eq!(map_angle_to_duty(90.0, &cal), 4833);

        // 1802 + (45 / 180) * 6062 = 3317.5 -> 3317
        assert_eq!(map_angle_to_duty(45.0, &cal), 3317);
    }

    #[test]
    fn test_out_of_range_saturates() {
        let cal = Calibration::default();
        for angle in [-0.001, -1.0, -90.0, f32::NEG_INFINITY] {
            assert_eq!(map_angle_to_duty(angle, &cal), cal.min_duty());
        }
        for angle in [180.001, 181.0, 720.0, f32::INFINITY] {
            assert_eq!(map_angle_to_duty(angle, &cal), cal.max_duty());
        }
        assert_eq!(map_angle_to_duty(f32::NAN, &cal), cal.min_duty());
    }

    #[test]
    fn test_monotonic_over_full_travel() {
        let calibrations = [
            Calibration::default(),
            Calibration::new(0, 1, 50).unwrap(),
            Calibration::new(1000, 2000, 50).unwrap(),
            Calibration::new(0, u16::MAX, 333).unwrap(),
        ];

        for cal in calibrations {
            let mut previous = map_angle_to_duty(0.0, &cal);
            // Tenth-of-a-degree resolution across [0, 180]
            for tenth in 0..=1800 {
                let duty = map_angle_to_duty(tenth as f32 / 10.0, &cal);
                assert!(
                    duty >= previous,
                    "duty decreased at {}°: {} < {}",
                    tenth as f32 / 10.0,
                    duty,
                    previous
                );
                assert!(duty >= cal.min_duty() && duty <= cal.max_duty());
                previous = duty;
            }
            assert_eq!(previous, cal.max_duty());
        }
    }

    #[test]
    fn test_calibration_rejects_inverted_range() {
        assert!(matches!(
            Calibration::new(7864, 1802, 50),
            Err(ServoError::InvalidParameter { name: "min_duty", .. })
        ));
        assert!(Calibration::new(1802, 1802, 50).is_err());
        assert!(Calibration::new(1802, 7864, 0).is_err());
    }

    #[test]
    fn test_clamp_angle() {
        assert_eq!(clamp_angle(-5.0), 0.0);
        assert_eq!(clamp_angle(42.5), 42.5);
        assert_eq!(clamp_angle(200.0), 180.0);
        assert_eq!(clamp_angle(f32::NAN), 0.0);
    }
}
