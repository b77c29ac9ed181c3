// PWM output seam
//
// The motion controller only ever talks to the actuator through `PwmSink`:
// configure the frequency, write/read a 16-bit duty, release the pin.

use std::time::Duration;
use tracing::{debug, info};

/// Error types for PWM hardware access
#[derive(Debug, thiserror::Error)]
pub enum PwmError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid PWM pin {pin}: {reason}")]
    InvalidPin { pin: u8, reason: String },

    #[error("PWM pin {pin} has already been released")]
    Released { pin: u8 },
}

/// Hardware PWM output driving a single servo pin
pub trait PwmSink {
    /// Pin identifier this sink drives
    fn pin(&self) -> u8;

    /// Set the PWM frequency in Hz
    fn configure(&mut self, frequency: u32) -> Result<(), PwmError>;

    /// Output a 16-bit duty value
    fn write_duty(&mut self, duty: u16) -> Result<(), PwmError>;

    /// Duty currently applied to the output
    fn read_duty(&self) -> Result<u16, PwmError>;

    /// Stop driving the pin and hand it back
    fn release(&mut self) -> Result<(), PwmError>;
}

/// Blocking suspension between duty writes
pub trait Delay {
    fn delay(&mut self, duration: Duration);
}

/// `Delay` backed by `std::thread::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadDelay;

impl Delay for ThreadDelay {
    fn delay(&mut self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// In-memory PWM output used when no hardware is attached
#[derive(Debug)]
pub struct SimulatedPwm {
    pin: u8,
    frequency: u32,
    duty: u16,
    writes: usize,
    released: bool,
}

impl SimulatedPwm {
    pub fn new(pin: u8) -> Self {
        info!("Simulated PWM output on pin {}", pin);
        Self {
            pin,
            frequency: 0,
            duty: 0,
            writes: 0,
            released: false,
        }
    }

    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    /// Number of duty writes since creation
    pub fn write_count(&self) -> usize {
        self.writes
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    fn ensure_active(&self) -> Result<(), PwmError> {
        if self.released {
            return Err(PwmError::Released { pin: self.pin });
        }
        Ok(())
    }
}

impl PwmSink for SimulatedPwm {
    fn pin(&self) -> u8 {
        self.pin
    }

    fn configure(&mut self, frequency: u32) -> Result<(), PwmError> {
        self.ensure_active()?;
        debug!("[sim] pin {} frequency = {} Hz", self.pin, frequency);
        self.frequency = frequency;
        Ok(())
    }

    fn write_duty(&mut self, duty: u16) -> Result<(), PwmError> {
        self.ensure_active()?;
        self.duty = duty;
        self.writes += 1;
        Ok(())
    }

    fn read_duty(&self) -> Result<u16, PwmError> {
        self.ensure_active()?;
        Ok(self.duty)
    }

    fn release(&mut self) -> Result<(), PwmError> {
        self.ensure_active()?;
        debug!("[sim] pin {} released after {} writes", self.pin, self.writes);
        self.duty = 0;
        self.released = true;
        Ok(())
    }
}

/// Recording doubles shared by the controller and runtime tests
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex, MutexGuard};

    #[derive(Debug, Default)]
    pub struct PwmLog {
        pub frequency: Option<u32>,
        pub writes: Vec<u16>,
        pub releases: usize,
        /// Fail every write once this many writes have succeeded
        pub fail_after_writes: Option<usize>,
        pub fail_configure: bool,
    }

    /// Sink that records every call; clones share the same log
    #[derive(Debug, Clone, Default)]
    pub struct RecordingPwm {
        pin: u8,
        log: Arc<Mutex<PwmLog>>,
    }

    impl RecordingPwm {
        pub fn new(pin: u8) -> Self {
            Self {
                pin,
                log: Arc::default(),
            }
        }

        pub fn log(&self) -> MutexGuard<'_, PwmLog> {
            self.log.lock().unwrap()
        }

        pub fn writes(&self) -> Vec<u16> {
            self.log().writes.clone()
        }

        pub fn clear_writes(&self) {
            self.log().writes.clear();
        }
    }

    impl PwmSink for RecordingPwm {
        fn pin(&self) -> u8 {
            self.pin
        }

        fn configure(&mut self, frequency: u32) -> Result<(), PwmError> {
            let mut log = self.log();
            if log.fail_configure {
                return Err(PwmError::InvalidPin {
                    pin: self.pin,
                    reason: "no PWM channel".to_string(),
                });
            }
            log.frequency = Some(frequency);
            Ok(())
        }

        fn write_duty(&mut self, duty: u16) -> Result<(), PwmError> {
            let mut log = self.log();
            if log.fail_after_writes.is_some_and(|n| log.writes.len() >= n) {
                return Err(PwmError::Io(std::io::Error::other("write failed")));
            }
            log.writes.push(duty);
            Ok(())
        }

        fn read_duty(&self) -> Result<u16, PwmError> {
            Ok(self.log().writes.last().copied().unwrap_or(0))
        }

        fn release(&mut self) -> Result<(), PwmError> {
            self.log().releases += 1;
            Ok(())
        }
    }

    /// Delay that only records requested pauses
    #[derive(Debug, Clone, Default)]
    pub struct RecordingDelay {
        pauses: Arc<Mutex<Vec<Duration>>>,
    }

    impl RecordingDelay {
        pub fn pauses(&self) -> Vec<Duration> {
            self.pauses.lock().unwrap().clone()
        }
    }

    impl Delay for RecordingDelay {
        fn delay(&mut self, duration: Duration) {
            self.pauses.lock().unwrap().push(duration);
        }
    }
}
