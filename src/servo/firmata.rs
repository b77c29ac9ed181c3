// Firmata PWM output over a serial link
//
// Drives one PWM pin of a microcontroller running (Configurable)Firmata.
// Duty values are sent with the EXTENDED_ANALOG sysex so the full 16-bit
// range reaches the board in 7-bit chunks:
// [0xF0, 0x6F, pin, bits 0-6, bits 7-13, bits 14-15, 0xF7]

use serialport::{self, SerialPort};
use std::io::Write;
use std::time::Duration;
use tracing::{debug, info};

use super::pwm::{PwmError, PwmSink};

/// Default serial configuration for Firmata firmwares
pub const DEFAULT_BAUDRATE: u32 = 57_600;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Firmata command bytes
const SET_PIN_MODE: u8 = 0xF4;
const START_SYSEX: u8 = 0xF0;
const END_SYSEX: u8 = 0xF7;
const EXTENDED_ANALOG: u8 = 0x6F;

/// Firmata data bytes are 7-bit
const DATA_MASK: u8 = 0x7F;

/// Firmata pin modes used here
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PinMode {
    Input = 0x00,
    Pwm = 0x03,
}

/// Firmata-backed PWM output for a single pin
pub struct FirmataPwm {
    port: Box<dyn SerialPort>,
    pin: u8,
    duty: u16,
    released: bool,
}

impl FirmataPwm {
    /// Open the serial port and claim `pin` for PWM output
    pub fn open_with_baudrate(port_name: &str, pin: u8, baudrate: u32) -> Result<Self, PwmError> {
        validate_pin(pin)?;

        info!("Opening Firmata link on {} ({} baud)", port_name, baudrate);
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self {
            port,
            pin,
            duty: 0,
            released: false,
        })
    }

    fn send(&mut self, payload: &[u8]) -> Result<(), PwmError> {
        if self.released {
            return Err(PwmError::Released { pin: self.pin });
        }
        self.port.write_all(payload)?;
        self.port.flush()?;
        Ok(())
    }
}

impl PwmSink for FirmataPwm {
    fn pin(&self) -> u8 {
        self.pin
    }

    fn configure(&mut self, frequency: u32) -> Result<(), PwmError> {
        // Firmata has no frequency message; the firmware owns the timer setup
        debug!(
            "Firmata pin {} -> PWM mode (expecting {} Hz timer)",
            self.pin, frequency
        );
        self.send(&set_pin_mode_payload(self.pin, PinMode::Pwm))
    }

    fn write_duty(&mut self, duty: u16) -> Result<(), PwmError> {
        self.send(&extended_analog_payload(self.pin, duty))?;
        self.duty = duty;
        Ok(())
    }

    fn read_duty(&self) -> Result<u16, PwmError> {
        if self.released {
            return Err(PwmError::Released { pin: self.pin });
        }
        // Firmata does not report output values; this is the last duty sent
        Ok(self.duty)
    }

    fn release(&mut self) -> Result<(), PwmError> {
        info!("Releasing Firmata pin {}", self.pin);
        self.send(&extended_analog_payload(self.pin, 0))?;
        self.send(&set_pin_mode_payload(self.pin, PinMode::Input))?;
        self.duty = 0;
        self.released = true;
        Ok(())
    }
}

/// Firmata addresses pins with a single 7-bit byte
fn validate_pin(pin: u8) -> Result<(), PwmError> {
    if pin > DATA_MASK {
        return Err(PwmError::InvalidPin {
            pin,
            reason: format!("Firmata pins are 0..={}", DATA_MASK),
        });
    }
    Ok(())
}

fn set_pin_mode_payload(pin: u8, mode: PinMode) -> [u8; 3] {
    [SET_PIN_MODE, pin, mode as u8]
}

fn extended_analog_payload(pin: u8, duty: u16) -> [u8; 7] {
    [
        START_SYSEX,
        EXTENDED_ANALOG,
        pin,
        duty as u8 & DATA_MASK,
        (duty >> 7) as u8 & DATA_MASK,
        (duty >> 14) as u8 & DATA_MASK,
        END_SYSEX,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extended_analog_payload() {
        // 4833 = 0b1_0010_1110_0001 -> low 0x61, mid 0x25, high 0x00
        let payload = extended_analog_payload(2, 4833);
        assert_eq!(payload, [0xF0, 0x6F, 2, 0x61, 0x25, 0x00, 0xF7]);

        // Reassemble the 7-bit chunks
        let duty = payload[3] as u16 | (payload[4] as u16) << 7 | (payload[5] as u16) << 14;
        assert_eq!(duty, 4833);
    }

    #[test]
    fn test_extended_analog_payload_full_scale() {
        let payload = extended_analog_payload(0, u16::MAX);
        assert_eq!(&payload[3..6], &[0x7F, 0x7F, 0x03]);
        assert!(payload[1..6].iter().all(|b| b & 0x80 == 0));
    }

    #[test]
    fn test_set_pin_mode_payload() {
        assert_eq!(set_pin_mode_payload(5, PinMode::Pwm), [0xF4, 5, 0x03]);
        assert_eq!(set_pin_mode_payload(5, PinMode::Input), [0xF4, 5, 0x00]);
    }

    #[test]
    fn test_pin_range() {
        assert!(validate_pin(0).is_ok());
        assert!(validate_pin(127).is_ok());
        assert!(matches!(
            validate_pin(128),
            Err(PwmError::InvalidPin { pin: 128, .. })
        ));
    }
}
