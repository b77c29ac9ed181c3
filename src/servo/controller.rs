// Motion controller for a single hobby servo
//
// Owns the PWM output and the last commanded position. Every motion is
// decomposed into `move_to_angle` calls, which walk the duty linearly from
// the current value to the target with a blocking pause between writes.

use std::time::Duration;
use tracing::{debug, info, warn};

use super::error::{Result, ServoError};
use super::mapper::{Calibration, clamp_angle, map_angle_to_duty};
use super::pwm::{Delay, PwmSink, ThreadDelay};
use crate::config::{
    BASE_STEP_DELAY, CALIBRATION_PAUSE, DEFAULT_SPEED, MAX_OSCILLATE_CYCLES, MAX_SWEEP_STEPS,
    STEP_GRANULARITY,
};
use crate::messages::MoveReport;

/// Last commanded position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorState {
    /// Degrees, always within [0, 180]
    pub current_angle: f32,
    /// Always `map_angle_to_duty(current_angle)` once a move completes
    pub current_duty: u16,
}

/// Single-servo motion controller
pub struct ServoController<P: PwmSink, D: Delay = ThreadDelay> {
    pwm: Option<P>,
    delay: D,
    calibration: Calibration,
    state: MotorState,
    default_speed: f32,
}

impl<P: PwmSink> ServoController<P> {
    /// Take ownership of the PWM output and park the servo at 0°
    pub fn new(pwm: P, calibration: Calibration) -> Result<Self> {
        Self::with_delay(pwm, calibration, ThreadDelay)
    }
}

impl<P: PwmSink, D: Delay> ServoController<P, D> {
    /// Create with a custom delay source
    ///
    /// Configures the PWM frequency and immediately drives the output to
    /// the 0° duty. On failure the output is released before returning.
    pub fn with_delay(mut pwm: P, calibration: Calibration, delay: D) -> Result<Self> {
        let duty = map_angle_to_duty(0.0, &calibration);
        info!(
            "Servo controller on pin {}: duty {}..{} @ {} Hz",
            pwm.pin(),
            calibration.min_duty(),
            calibration.max_duty(),
            calibration.pwm_frequency()
        );

        let startup = pwm
            .configure(calibration.pwm_frequency())
            .and_then(|_| pwm.write_duty(duty));
        if let Err(e) = startup {
            if let Err(release_err) = pwm.release() {
                warn!("Failed to release pin {}: {}", pwm.pin(), release_err);
            }
            return Err(e.into());
        }

        Ok(Self {
            pwm: Some(pwm),
            delay,
            calibration,
            state: MotorState {
                current_angle: 0.0,
                current_duty: duty,
            },
            default_speed: DEFAULT_SPEED,
        })
    }

    /// Speed used by sweep, sequence and calibrate
    pub fn set_default_speed(&mut self, speed: f32) -> Result<()> {
        step_pause(speed)?;
        self.default_speed = speed;
        Ok(())
    }

    pub fn default_speed(&self) -> f32 {
        self.default_speed
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn state(&self) -> MotorState {
        self.state
    }

    pub fn current_angle(&self) -> f32 {
        self.state.current_angle
    }

    pub fn current_duty(&self) -> u16 {
        self.state.current_duty
    }

    pub fn is_initialized(&self) -> bool {
        self.pwm.is_some()
    }

    /// Duty as reported by the PWM output itself
    pub fn hardware_duty(&self) -> Result<u16> {
        let pwm = self.pwm.as_ref().ok_or(ServoError::NotInitialized)?;
        Ok(pwm.read_duty()?)
    }

    /// Move smoothly to `angle` (saturated into [0, 180]) and return the final duty
    ///
    /// `speed` scales both the step size and the pause between writes and
    /// must be a finite positive number.
    pub fn move_to_angle(&mut self, angle: f32, speed: f32) -> Result<u16> {
        if self.pwm.is_none() {
            return Err(ServoError::NotInitialized);
        }
        let pause = step_pause(speed)?;

        let angle = clamp_angle(angle);
        let target = map_angle_to_duty(angle, &self.calibration);
        let start = self.state.current_duty;

        if target != start {
            let distance = start.abs_diff(target);
            let step_size = ((distance as f32 / (speed * STEP_GRANULARITY)) as u16).max(1);
            debug!(
                "Interpolating {} -> {} in steps of {} ({:?} apart)",
                start, target, step_size, pause
            );

            for duty in interpolation_steps(start, target, step_size) {
                self.write(duty)?;
                self.delay.delay(pause);
            }
        }

        // Exact target last, whatever rounding happened in the walk
        self.write(target)?;
        self.state = MotorState {
            current_angle: angle,
            current_duty: target,
        };
        info!("Angle: {}° - Duty: {}", angle, target);

        Ok(target)
    }

    /// Step through `start..=end` by `|step|` degrees, pausing `delay` after each move
    pub fn sweep(
        &mut self,
        start_angle: f32,
        end_angle: f32,
        step: f32,
        delay: Duration,
    ) -> Result<Vec<MoveReport>> {
        let angles = sweep_angles(start_angle, end_angle, step)?;
        self.ensure_initialized()?;

        let mut reports = Vec::with_capacity(angles.len());
        for angle in angles {
            reports.push(self.report_move(angle, self.default_speed)?);
            self.delay.delay(delay);
        }
        Ok(reports)
    }

    /// Swing between `center + amplitude` and `center - amplitude`, then recenter
    ///
    /// Targets outside [0, 180] saturate like any other move.
    pub fn oscillate(
        &mut self,
        center_angle: f32,
        amplitude: f32,
        cycles: i32,
        speed: f32,
    ) -> Result<Vec<MoveReport>> {
        if !(0..=MAX_OSCILLATE_CYCLES).contains(&cycles) {
            return Err(ServoError::invalid(
                "cycles",
                format!("must be within 0..={} (got {})", MAX_OSCILLATE_CYCLES, cycles),
            ));
        }
        step_pause(speed)?;
        self.ensure_initialized()?;

        let mut reports = Vec::new();
        for _ in 0..cycles {
            reports.push(self.report_move(center_angle + amplitude, speed)?);
            reports.push(self.report_move(center_angle - amplitude, speed)?);
        }
        reports.push(self.report_move(center_angle, speed)?);
        Ok(reports)
    }

    /// Visit `angles` in order, pausing for the delay paired with each
    ///
    /// Both slices must have the same length.
    pub fn sequence(&mut self, angles: &[f32], delays: &[Duration]) -> Result<Vec<MoveReport>> {
        if angles.len() != delays.len() {
            return Err(ServoError::invalid(
                "delays",
                format!(
                    "expected one delay per angle ({} angles, {} delays)",
                    angles.len(),
                    delays.len()
                ),
            ));
        }
        self.ensure_initialized()?;

        let mut reports = Vec::with_capacity(angles.len());
        for (&angle, &delay) in angles.iter().zip(delays) {
            reports.push(self.report_move(angle, self.default_speed)?);
            self.delay.delay(delay);
        }
        Ok(reports)
    }

    /// Diagnostic pass over `test_angles`, holding each position for observation
    pub fn calibrate(&mut self, test_angles: &[f32]) -> Result<Vec<MoveReport>> {
        self.ensure_initialized()?;
        info!("Calibrating servo over {} angles", test_angles.len());

        let mut reports = Vec::with_capacity(test_angles.len());
        for &angle in test_angles {
            let report = self.report_move(angle, self.default_speed)?;
            info!("  {}° -> Duty: {}", report.angle, report.duty);
            reports.push(report);
            self.delay.delay(CALIBRATION_PAUSE);
        }
        Ok(reports)
    }

    /// Release the PWM output. Calling it again is a no-op.
    pub fn deinitialize(&mut self) -> Result<()> {
        match self.pwm.take() {
            Some(mut pwm) => {
                pwm.release()?;
                info!("Servo on pin {} released", pwm.pin());
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.pwm.is_none() {
            return Err(ServoError::NotInitialized);
        }
        Ok(())
    }

    fn report_move(&mut self, angle: f32, speed: f32) -> Result<MoveReport> {
        let duty = self.move_to_angle(angle, speed)?;
        Ok(MoveReport {
            angle: self.state.current_angle,
            duty,
        })
    }

    /// Write one duty value; a hardware failure releases the output for good
    fn write(&mut self, duty: u16) -> Result<()> {
        let pwm = self.pwm.as_mut().ok_or(ServoError::NotInitialized)?;
        debug!("duty <- {}", duty);
        if let Err(e) = pwm.write_duty(duty) {
            if let Some(mut pwm) = self.pwm.take() {
                if let Err(release_err) = pwm.release() {
                    warn!("Failed to release pin {}: {}", pwm.pin(), release_err);
                }
            }
            return Err(e.into());
        }
        Ok(())
    }
}

impl<P: PwmSink, D: Delay> Drop for ServoController<P, D> {
    fn drop(&mut self) {
        // Release the output on every exit path
        if let Err(e) = self.deinitialize() {
            warn!("Failed to release servo on drop: {}", e);
        }
    }
}

/// Pause between interpolation writes for a given speed
fn step_pause(speed: f32) -> Result<Duration> {
    if !speed.is_finite() || speed <= 0.0 {
        return Err(ServoError::invalid(
            "speed",
            format!("must be a finite positive number (got {})", speed),
        ));
    }
    Duration::try_from_secs_f64(BASE_STEP_DELAY.as_secs_f64() / speed as f64)
        .map_err(|_| ServoError::invalid("speed", format!("too small (got {})", speed)))
}

/// Intermediate duties from `start` toward `target`, excluding `target`
fn interpolation_steps(start: u16, target: u16, step_size: u16) -> Box<dyn Iterator<Item = u16>> {
    let step = step_size.max(1) as usize;
    if target > start {
        Box::new((start..target).step_by(step))
    } else {
        Box::new((target + 1..=start).rev().step_by(step))
    }
}

/// Angles visited by a sweep from `start` to `end` (inclusive when reachable)
fn sweep_angles(start: f32, end: f32, step: f32) -> Result<Vec<f32>> {
    if !start.is_finite() || !end.is_finite() {
        return Err(ServoError::invalid(
            "start_angle",
            format!("sweep bounds must be finite ({} -> {})", start, end),
        ));
    }
    let step = step.abs();
    if !step.is_finite() || step == 0.0 {
        return Err(ServoError::invalid(
            "step",
            format!("must be finite and non-zero (got {})", step),
        ));
    }

    let span = (end as f64 - start as f64).abs();
    // Tolerate float noise so 0..=180 by 0.1 still reaches 180
    let count = (span / step as f64 + 1e-6).floor();
    if count > MAX_SWEEP_STEPS as f64 {
        return Err(ServoError::invalid(
            "step",
            format!("{} is too small for a {}° sweep", step, span),
        ));
    }
    let count = count as usize;
    let direction = if start < end { 1.0 } else { -1.0 };

    Ok((0..=count)
        .map(|i| (start as f64 + direction * i as f64 * step as f64) as f32)
        .collect())
}
