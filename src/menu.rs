// Interactive operator menu
//
// Keys are read in raw mode with a short poll so the cancel token is seen
// even while waiting for input. Raw mode is dropped again before any motion
// runs, so log output keeps its normal line endings.

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::{self, Write};
use tracing::info;

use crate::config::{DEFAULT_CALIBRATION_ANGLES, INPUT_POLL};
use crate::messages::{MotionCommand, MoveReport};
use crate::runtime::{BoxError, CancelToken, Runtime};
use crate::servo::{Delay, PwmSink};

/// Menu entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Calibrate,
    Sweep,
    Oscillate,
    Sequence,
    MoveTo,
    Status,
    Quit,
}

impl MenuChoice {
    pub fn from_key(key: char) -> Option<Self> {
        match key.to_ascii_lowercase() {
            '1' => Some(MenuChoice::Calibrate),
            '2' => Some(MenuChoice::Sweep),
            '3' => Some(MenuChoice::Oscillate),
            '4' => Some(MenuChoice::Sequence),
            '5' => Some(MenuChoice::MoveTo),
            '6' | 'q' => Some(MenuChoice::Quit),
            's' => Some(MenuChoice::Status),
            _ => None,
        }
    }

    /// Preset commands for entries that need no further input
    pub fn preset(self) -> Vec<MotionCommand> {
        match self {
            MenuChoice::Calibrate => vec![MotionCommand::Calibrate {
                angles: Some(DEFAULT_CALIBRATION_ANGLES.to_vec()),
            }],
            // There and back, 2° steps
            MenuChoice::Sweep => vec![
                MotionCommand::Sweep {
                    start: 0.0,
                    end: 180.0,
                    step: 2.0,
                    delay_ms: 30,
                },
                MotionCommand::Sweep {
                    start: 180.0,
                    end: 0.0,
                    step: 2.0,
                    delay_ms: 30,
                },
            ],
            MenuChoice::Oscillate => vec![MotionCommand::Oscillate {
                center: 90.0,
                amplitude: 30.0,
                cycles: 5,
                speed: Some(1.5),
            }],
            MenuChoice::Sequence => vec![MotionCommand::Sequence {
                angles: vec![0.0, 45.0, 90.0, 135.0, 180.0, 90.0, 45.0, 0.0],
                delays_ms: vec![500, 500, 500, 500, 500, 500, 500, 1000],
            }],
            MenuChoice::Status => vec![MotionCommand::Status],
            MenuChoice::MoveTo | MenuChoice::Quit => Vec::new(),
        }
    }
}

/// Parse an operator-entered angle
pub fn parse_angle(input: &str) -> Option<f32> {
    input
        .trim()
        .parse::<f32>()
        .ok()
        .filter(|angle| angle.is_finite())
}

/// Keys the menu reacts to
enum Key {
    Char(char),
    Enter,
    Backspace,
    Escape,
}

/// Raw mode for the lifetime of the guard
struct RawMode;

impl RawMode {
    fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(RawMode)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// Wait for the next key press; `None` once cancelled (Ctrl+C cancels)
fn next_key(cancel: &CancelToken) -> io::Result<Option<Key>> {
    let _raw = RawMode::enable()?;

    loop {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        if !event::poll(INPUT_POLL)? {
            continue;
        }
        let Event::Key(KeyEvent {
            code,
            kind,
            modifiers,
            ..
        }) = event::read()?
        else {
            continue;
        };
        if kind != KeyEventKind::Press {
            continue;
        }

        let key = match code {
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                cancel.cancel();
                return Ok(None);
            }
            KeyCode::Char(c) => Key::Char(c),
            KeyCode::Enter => Key::Enter,
            KeyCode::Backspace => Key::Backspace,
            KeyCode::Esc => Key::Escape,
            _ => continue,
        };
        return Ok(Some(key));
    }
}

/// Prompt until a valid angle is entered; `None` on Esc or cancel
fn read_angle(cancel: &CancelToken) -> io::Result<Option<f32>> {
    loop {
        print!("Angle (0-180): ");
        io::stdout().flush()?;

        let mut input = String::new();
        loop {
            match next_key(cancel)? {
                None | Some(Key::Escape) => {
                    println!();
                    return Ok(None);
                }
                Some(Key::Enter) => break,
                Some(Key::Backspace) => {
                    if input.pop().is_some() {
                        print!("\u{8} \u{8}");
                    }
                }
                Some(Key::Char(c)) if c.is_ascii_digit() || c == '.' || c == '-' => {
                    input.push(c);
                    print!("{}", c);
                }
                Some(Key::Char(_)) => continue,
            }
            io::stdout().flush()?;
        }
        println!();

        match parse_angle(&input) {
            Some(angle) => return Ok(Some(angle)),
            None => println!("Invalid angle: {:?}", input),
        }
    }
}

fn print_menu() {
    println!();
    println!("Servo menu:");
    println!("  1. Calibrate");
    println!("  2. Sweep 0° -> 180° -> 0°");
    println!("  3. Oscillate around 90°");
    println!("  4. Run sequence");
    println!("  5. Move to angle");
    println!("  6. Quit");
    println!("  s. Status");
    print!("Choice (1-6): ");
    let _ = io::stdout().flush();
}

fn print_reports(reports: &[MoveReport]) {
    if let Some(last) = reports.last() {
        println!(
            "  {} move(s), now at {}° (duty {})",
            reports.len(),
            last.angle,
            last.duty
        );
    }
}

/// Interactive loop; returns when the operator quits or the session is cancelled
pub fn run_menu<P: PwmSink, D: Delay>(runtime: &mut Runtime<P, D>) -> Result<(), BoxError> {
    let cancel = runtime.cancel_token().clone();

    loop {
        if cancel.is_cancelled() {
            info!("Menu cancelled");
            return Ok(());
        }
        print_menu();

        let choice = match next_key(&cancel)? {
            None | Some(Key::Escape) => MenuChoice::Quit,
            Some(Key::Char(c)) => match MenuChoice::from_key(c) {
                Some(choice) => {
                    println!("{}", c);
                    choice
                }
                None => {
                    println!("\nInvalid choice: {:?}", c);
                    continue;
                }
            },
            Some(_) => {
                println!();
                continue;
            }
        };

        let commands = match choice {
            MenuChoice::Quit => {
                println!("Bye");
                return Ok(());
            }
            MenuChoice::MoveTo => match read_angle(&cancel)? {
                Some(angle) => vec![MotionCommand::MoveTo { angle, speed: None }],
                None => continue,
            },
            other => other.preset(),
        };

        for command in &commands {
            if cancel.is_cancelled() {
                break;
            }
            match runtime.execute(command) {
                Ok(reports) => print_reports(&reports),
                Err(e) if !e.is_fatal() => println!("Error: {}", e),
                Err(e) => return Err(e.into()),
            }
        }
    }
}
