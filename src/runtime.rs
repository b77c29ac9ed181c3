// Session driver: owns the servo controller for the lifetime of one session
//
// Commands come from the interactive menu or a JSON script. A cancel token
// (Ctrl+C, menu quit) is checked between operations, and the PWM output is
// released on every way out of the session.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use crate::config::{Cli, DEFAULT_CALIBRATION_ANGLES};
use crate::menu;
use crate::messages::{MotionCommand, MoveReport, millis};
use crate::servo::{
    Calibration, Delay, FirmataPwm, PwmSink, ServoController, ServoError, SimulatedPwm,
    ThreadDelay,
};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Cooperative cancellation flag shared with the signal handler
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a batch of commands ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Completed,
    Cancelled,
}

pub struct Runtime<P: PwmSink, D: Delay = ThreadDelay> {
    controller: ServoController<P, D>,
    cancel: CancelToken,
}

impl<P: PwmSink, D: Delay> Runtime<P, D> {
    pub fn new(controller: ServoController<P, D>, cancel: CancelToken) -> Self {
        Self { controller, cancel }
    }

    pub fn controller(&self) -> &ServoController<P, D> {
        &self.controller
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Run one command to completion
    pub fn execute(&mut self, command: &MotionCommand) -> Result<Vec<MoveReport>, ServoError> {
        info!("Executing {}", command.name());
        let speed = self.controller.default_speed();

        match command {
            MotionCommand::MoveTo { angle, speed: s } => {
                let duty = self.controller.move_to_angle(*angle, s.unwrap_or(speed))?;
                Ok(vec![MoveReport {
                    angle: self.controller.current_angle(),
                    duty,
                }])
            }
            MotionCommand::Sweep {
                start,
                end,
                step,
                delay_ms,
            } => self.controller.sweep(
                *start,
                *end,
                *step,
                std::time::Duration::from_millis(*delay_ms),
            ),
            MotionCommand::Oscillate {
                center,
                amplitude,
                cycles,
                speed: s,
            } => self
                .controller
                .oscillate(*center, *amplitude, *cycles, s.unwrap_or(speed)),
            MotionCommand::Sequence { angles, delays_ms } => {
                self.controller.sequence(angles, &millis(delays_ms))
            }
            MotionCommand::Calibrate { angles } => {
                let angles = angles.as_deref().unwrap_or(&DEFAULT_CALIBRATION_ANGLES[..]);
                self.controller.calibrate(angles)
            }
            MotionCommand::Status => {
                let state = self.controller.state();
                let hardware = self.controller.hardware_duty()?;
                info!(
                    "Status: angle {}°, duty {} (output reports {})",
                    state.current_angle, state.current_duty, hardware
                );
                Ok(Vec::new())
            }
        }
    }

    /// Run commands in order until done or cancelled
    ///
    /// Invalid parameters skip the offending command; hardware faults and use
    /// after deinitialization end the batch with an error.
    pub fn run_batch<I>(&mut self, commands: I) -> Result<BatchOutcome, ServoError>
    where
        I: IntoIterator<Item = MotionCommand>,
    {
        for command in commands {
            if self.cancel.is_cancelled() {
                warn!("Cancelled, skipping remaining commands");
                return Ok(BatchOutcome::Cancelled);
            }

            match self.execute(&command) {
                Ok(reports) => {
                    if let Some(last) = reports.last() {
                        info!(
                            "{} done: {} moves, final {}° @ duty {}",
                            command.name(),
                            reports.len(),
                            last.angle,
                            last.duty
                        );
                    }
                }
                Err(e) if !e.is_fatal() => warn!("Skipping {}: {}", command.name(), e),
                Err(e) => return Err(e),
            }
        }
        Ok(BatchOutcome::Completed)
    }

    /// Release the servo output
    pub fn shutdown(mut self) -> Result<(), ServoError> {
        self.controller.deinitialize()
    }
}

/// Read a JSON script of motion commands
pub async fn load_script(path: &Path) -> Result<Vec<MotionCommand>, BoxError> {
    let text = tokio::fs::read_to_string(path).await?;
    let commands: Vec<MotionCommand> = serde_json::from_str(&text)?;
    info!("Loaded {} commands from {}", commands.len(), path.display());
    Ok(commands)
}

pub async fn run(cli: Cli) -> Result<(), BoxError> {
    let calibration = cli.calibration()?;
    let script = match &cli.script {
        Some(path) => Some(load_script(path).await?),
        None => None,
    };

    // Ctrl+C outside raw mode lands here; the session checks the token between operations
    let cancel = CancelToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current operation");
            signal_token.cancel();
        }
    });

    // Motion is blocking (sleep between duty writes), keep it off the async workers
    tokio::task::spawn_blocking(move || open_and_drive(&cli, calibration, script, cancel))
        .await?
}

fn open_and_drive(
    cli: &Cli,
    calibration: Calibration,
    script: Option<Vec<MotionCommand>>,
    cancel: CancelToken,
) -> Result<(), BoxError> {
    match &cli.port {
        Some(port) => {
            let pwm = FirmataPwm::open_with_baudrate(port, cli.pin, cli.baud)?;
            drive(pwm, calibration, cli.speed, script, cancel)
        }
        None => {
            info!("No serial port given, using simulated PWM output");
            drive(SimulatedPwm::new(cli.pin), calibration, cli.speed, script, cancel)
        }
    }
}

/// Run one session against an opened PWM output
pub fn drive<P: PwmSink>(
    pwm: P,
    calibration: Calibration,
    speed: f32,
    script: Option<Vec<MotionCommand>>,
    cancel: CancelToken,
) -> Result<(), BoxError> {
    // Dropping the controller on an early return releases the output too
    let mut controller = ServoController::new(pwm, calibration)?;
    controller.set_default_speed(speed)?;
    let mut runtime = Runtime::new(controller, cancel);

    let result = match script {
        Some(commands) => runtime
            .run_batch(commands)
            .map(|outcome| info!("Script {:?}", outcome))
            .map_err(BoxError::from),
        None => menu::run_menu(&mut runtime),
    };

    let released = runtime.shutdown();
    result?;
    released?;
    info!("Session finished");
    Ok(())
}
