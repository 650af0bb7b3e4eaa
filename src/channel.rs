//! One controllable output: a named piece of hardware on one board pin.

use crate::board::{PinNumber, SharedBoard};
use crate::clock::Clock;
use crate::error::Result;
use crate::firmata::PinMode;
use crate::pin_state::PinState;
use crate::result_writer::{ControllerEventRecord, ResultRow, SharedSink};

use log::warn;

/// Writes to one pin and keeps the shared pin state and controller event log
/// in step with what the board was told.
#[derive(Clone)]
pub struct HardwareChannel {
    hardware: String,
    pin: PinNumber,
    mode: PinMode,
    board: SharedBoard,
    pins: PinState,
    clock: Clock,
    events: Option<SharedSink>,
}

impl HardwareChannel {
    pub fn new(
        hardware: &str,
        pin: PinNumber,
        mode: PinMode,
        board: SharedBoard,
        pins: PinState,
        clock: Clock,
    ) -> Self {
        Self {
            hardware: hardware.to_owned(),
            pin,
            mode,
            board,
            pins,
            clock,
            events: None,
        }
    }

    /// Log every change as a controller event to `sink`.
    pub fn with_events(mut self, sink: Option<SharedSink>) -> Self {
        self.events = sink;
        self
    }

    pub fn hardware(&self) -> &str {
        &self.hardware
    }

    pub fn pin(&self) -> PinNumber {
        self.pin
    }

    pub fn mode(&self) -> PinMode {
        self.mode
    }

    /// Put the pin in this channel's mode.
    pub fn configure(&self) -> Result<()> {
        self.board
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .configure(self.pin, self.mode)
    }

    pub fn turn_on(&self, value: f64) -> Result<()> {
        self.write(value)
    }

    pub fn turn_off(&self) -> Result<()> {
        self.write(0.0)
    }

    /// Set the output to `value`. The pin state only changes if the board
    /// accepted the write.
    pub fn write(&self, value: f64) -> Result<()> {
        self.board
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .write(self.pin, value, self.mode)?;
        self.pins.set(&self.hardware, value);

        if let Some(sink) = &self.events {
            let row = ResultRow::ControllerEvent(ControllerEventRecord {
                timestamp: self.clock.elapsed(),
                pin_state: self.pins.snapshot(),
            });
            let written = sink
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .write(&row);
            if let Err(e) = written {
                warn!("{} : could not log controller event: {}", self.hardware, e);
            }
        }
        Ok(())
    }
}
