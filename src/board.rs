//! The microcontroller the paradigm is played on.
//!
//! [`Board`] is deliberately tiny so that a serial Firmata board and the
//! logging [`DummyBoard`] are interchangeable behind a [`SharedBoard`].

use crate::error::{LearnMemError, Result};
use crate::firmata::{self, PinMode};

use log::{debug, info};
use serial2::SerialPort;
use std::{
    collections::HashSet,
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    thread,
    time::{Duration, Instant},
};

/// Physical pin number on the board.
pub type PinNumber = u8;

/// Anything that can set an output channel to a value in `0.0..=1.0`.
pub trait Board: Send {
    /// Human readable name, used in logs.
    fn name(&self) -> &str;

    /// Prepare `pin` to be driven in `mode`. Called once per channel when a
    /// schedule starts.
    fn configure(&mut self, _pin: PinNumber, _mode: PinMode) -> Result<()> {
        Ok(())
    }

    /// Set `pin` to `value`.
    fn write(&mut self, pin: PinNumber, value: f64, mode: PinMode) -> Result<()>;

    /// Release the connection. Further writes may fail.
    fn close(&mut self) -> Result<()>;
}

/// A board shared by every event thread of a schedule.
pub type SharedBoard = Arc<Mutex<dyn Board>>;

/// Wrap a board so it can be shared across event threads.
pub fn shared<B: Board + 'static>(board: B) -> SharedBoard {
    Arc::new(Mutex::new(board))
}

/// Lists the serial devices the OS knows about.
pub fn available_ports() -> Result<Vec<PathBuf>> {
    SerialPort::available_ports().map_err(|e| LearnMemError::HardwareConnection(e.to_string()))
}

/// A board running StandardFirmata, reached over a serial port.
pub struct FirmataBoard {
    name: String,
    port: SerialPort,
}

impl FirmataBoard {
    /// Open the serial device at `path`. Opening resets most Arduinos, so we
    /// give the firmware `settle` to boot before the first message.
    pub fn open(path: impl AsRef<Path>, baud_rate: u32, settle: Duration) -> Result<Self> {
        let path = path.as_ref();
        let mut port = SerialPort::open(path, baud_rate).map_err(|e| {
            LearnMemError::HardwareConnection(format!("{}: {}", path.display(), e))
        })?;
        port.set_write_timeout(Duration::from_secs(1))
            .map_err(|e| LearnMemError::HardwareConnection(e.to_string()))?;
        thread::sleep(settle);
        info!("Opened Firmata board on {} @ {} baud", path.display(), baud_rate);

        Ok(Self {
            name: format!("Firmata@{}", path.display()),
            port,
        })
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.port
            .write_all(bytes)
            .and_then(|_| self.port.flush())
            .map_err(|e| LearnMemError::Hardware(format!("{}: {}", self.name, e)))
    }
}

impl Board for FirmataBoard {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure(&mut self, pin: PinNumber, mode: PinMode) -> Result<()> {
        self.send(&firmata::set_pin_mode(pin, mode))
    }

    fn write(&mut self, pin: PinNumber, value: f64, mode: PinMode) -> Result<()> {
        self.send(&firmata::write(pin, value, mode))
    }

    fn close(&mut self) -> Result<()> {
        self.port
            .flush()
            .map_err(|e| LearnMemError::Hardware(format!("{}: {}", self.name, e)))
    }
}

/// One write received by a [`DummyBoard`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoardWrite {
    pub pin: PinNumber,
    pub value: f64,
    pub mode: PinMode,
    pub at: Instant,
}

/// A handle onto the writes a [`DummyBoard`] has received. It stays valid
/// after the board itself has been moved into a [`SharedBoard`].
#[derive(Debug, Clone, Default)]
pub struct WriteHistory {
    writes: Arc<Mutex<Vec<BoardWrite>>>,
    modes: Arc<Mutex<Vec<(PinNumber, PinMode)>>>,
}

impl WriteHistory {
    fn push(&self, write: BoardWrite) {
        self.writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(write);
    }

    fn push_mode(&self, pin: PinNumber, mode: PinMode) {
        self.modes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((pin, mode));
    }

    /// Every pin mode change, in arrival order.
    pub fn modes(&self) -> Vec<(PinNumber, PinMode)> {
        self.modes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Every write, in arrival order.
    pub fn writes(&self) -> Vec<BoardWrite> {
        self.writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Every write to `pin`, in arrival order.
    pub fn writes_for(&self, pin: PinNumber) -> Vec<BoardWrite> {
        self.writes().into_iter().filter(|w| w.pin == pin).collect()
    }

    /// The last value written to `pin`.
    pub fn last_value(&self, pin: PinNumber) -> Option<f64> {
        self.writes_for(pin).last().map(|w| w.value)
    }
}

/// A board that only logs. Useful with no hardware attached, and in tests.
#[derive(Debug, Default)]
pub struct DummyBoard {
    history: WriteHistory,
    failing: HashSet<PinNumber>,
    closed: bool,
}

impl DummyBoard {
    pub fn new() -> Self {
        info!("Initialized dummy board");
        Self::default()
    }

    /// Make every write to `pin` fail, to exercise error isolation.
    pub fn failing_on(mut self, pin: PinNumber) -> Self {
        self.failing.insert(pin);
        self
    }

    /// The write log of this board.
    pub fn history(&self) -> WriteHistory {
        self.history.clone()
    }
}

impl Board for DummyBoard {
    fn name(&self) -> &str {
        "DummyBoard"
    }

    fn configure(&mut self, pin: PinNumber, mode: PinMode) -> Result<()> {
        debug!("DummyBoard : pin {:03} in {:?} mode", pin, mode);
        self.history.push_mode(pin, mode);
        Ok(())
    }

    fn write(&mut self, pin: PinNumber, value: f64, mode: PinMode) -> Result<()> {
        if self.failing.contains(&pin) {
            return Err(LearnMemError::Hardware(format!("pin {} is not answering", pin)));
        }
        debug!("DummyBoard : pin {:03} ---> {:.8} ({:?})", pin, value, mode);
        self.history.push(BoardWrite {
            pin,
            value,
            mode,
            at: Instant::now(),
        });
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            info!("DummyBoard : closed");
            self.closed = true;
        }
        Ok(())
    }
}
