//! Loading of paradigm tables and the hardware-to-pin mapping.
//!
//! A paradigm is a CSV table with one row per hardware event:
//!
//! ```text
//! hardware,start,end,on,off,value
//! ODOR_A_LEFT,1,2,NaN,NaN,1
//! SHOCK,1,2,1/60,4/60,
//! ```
//!
//! `pin_id` is accepted in place of `hardware`, and `value` is optional. Rows
//! that make no sense on their own (non-positive duration, half a duty cycle,
//! unreadable numbers) are dropped with a warning. A hardware name that the
//! mapping does not know, or a missing column, fails the whole load.

use crate::barrier::quantize;
use crate::board::PinNumber;
use crate::error::{LearnMemError, Result};
use crate::firmata::PinMode;
use crate::paradigm_decoder::decode_cell;

use csv::{ReaderBuilder, StringRecord, Trim};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs::File, io, path::Path};

/// The unit the time columns of a paradigm file are written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeUnit {
    Seconds,
    Minutes,
}

impl TimeUnit {
    fn seconds(self) -> f64 {
        match self {
            TimeUnit::Seconds => 1.0,
            TimeUnit::Minutes => 60.0,
        }
    }
}

/// One row of a paradigm, in seconds from paradigm start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareEventRow {
    pub hardware: String,
    pub start: f64,
    pub end: f64,
    pub on: Option<f64>,
    pub off: Option<f64>,
    pub value: f64,
}

impl HardwareEventRow {
    /// A plain row holding `hardware` at 1 from `start` to `end`.
    pub fn new(hardware: &str, start: f64, end: f64) -> Self {
        Self {
            hardware: hardware.to_owned(),
            start,
            end,
            on: None,
            off: None,
            value: 1.0,
        }
    }

    /// Turn this row into a duty cycle of `on` seconds on, `off` seconds off.
    pub fn with_wave(mut self, on: f64, off: f64) -> Self {
        self.on = Some(on);
        self.off = Some(off);
        self
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = value;
        self
    }

    /// `(on, off)` if this row cycles.
    pub fn duty_cycle(&self) -> Option<(f64, f64)> {
        self.on.zip(self.off)
    }

    /// How the channel must be driven for this row's value.
    pub fn mode(&self) -> PinMode {
        PinMode::for_value(self.value)
    }

    /// The reason this row cannot be scheduled, if any.
    fn problem(&self) -> Option<String> {
        if self.end <= self.start {
            return Some(format!(
                "end ({}) is not after start ({})",
                self.end, self.start
            ));
        }
        // start and end would meet at one barrier and wait for each other
        if quantize(self.end) <= quantize(self.start) {
            return Some(format!(
                "window {}..{} is shorter than a millisecond",
                self.start, self.end
            ));
        }
        if self.on.is_some() ^ self.off.is_some() {
            return Some("either on or off is defined but not the other".to_owned());
        }
        if let Some((on, off)) = self.duty_cycle() {
            if on < 0.0 || off < 0.0 || on + off <= 0.0 {
                return Some(format!("invalid duty cycle on={} off={}", on, off));
            }
        }
        if !(0.0..=1.0).contains(&self.value) {
            return Some(format!("value {} is outside [0, 1]", self.value));
        }
        None
    }
}

/// Unify the spellings of a hardware name.
pub fn normalize_hardware(name: &str) -> String {
    name.trim().to_ascii_uppercase().replace("ODOUR", "ODOR")
}

/// Which pin each piece of hardware is wired to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mapping {
    pins: BTreeMap<String, PinNumber>,
}

impl Mapping {
    /// Build a mapping from `(hardware, pin)` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, PinNumber)>,
        S: AsRef<str>,
    {
        let pins = pairs
            .into_iter()
            .map(|(h, p)| (normalize_hardware(h.as_ref()), p))
            .collect();
        Self { pins }
    }

    /// Read a mapping CSV with `pin_id` and `pin_number` columns.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            LearnMemError::Configuration(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_reader(file)
    }

    /// Read a mapping CSV with `pin_id` and `pin_number` columns.
    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self> {
        let mut csv = table_reader(reader);
        let headers = lowercase_headers(&mut csv)?;
        let id_col = column(&headers, &["pin_id", "hardware"]);
        let pin_col = column(&headers, &["pin_number"]);
        let (id_col, pin_col) = match (id_col, pin_col) {
            (Some(i), Some(p)) => (i, p),
            _ => {
                return Err(LearnMemError::Configuration(format!(
                    "mapping requires columns pin_id and pin_number, found {:?}",
                    headers
                )))
            }
        };

        let mut pins = BTreeMap::new();
        for record in csv.records() {
            let record = record?;
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            let hardware = normalize_hardware(record.get(id_col).unwrap_or_default());
            let pin = record
                .get(pin_col)
                .unwrap_or_default()
                .parse::<PinNumber>()
                .map_err(|e| {
                    LearnMemError::Configuration(format!("mapping line {}: {}", line, e))
                })?;
            if hardware.is_empty() {
                continue;
            }
            pins.insert(hardware, pin);
        }
        debug!("Mapping: {:?}", pins);
        Ok(Self { pins })
    }

    /// The pin `hardware` is wired to.
    pub fn resolve(&self, hardware: &str) -> Option<PinNumber> {
        self.pins.get(&normalize_hardware(hardware)).copied()
    }

    /// Every mapped hardware name, in name order.
    pub fn hardware(&self) -> impl Iterator<Item = &str> {
        self.pins.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }
}

/// A row that was dropped while loading, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRow {
    /// Line in the source table, or the row index for in-memory tables.
    pub line: u64,
    pub reason: String,
}

/// A validated row bound to its physical pin.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEvent {
    /// Position among the accepted rows.
    pub index: usize,
    pub row: HardwareEventRow,
    pub pin: PinNumber,
}

/// The outcome of loading a table: the events that will run, and the rows
/// that were dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Paradigm {
    events: Vec<ResolvedEvent>,
    skipped: Vec<SkippedRow>,
}

impl Paradigm {
    pub fn events(&self) -> &[ResolvedEvent] {
        &self.events
    }

    pub fn skipped(&self) -> &[SkippedRow] {
        &self.skipped
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// The end of the last event, in seconds.
    pub fn duration(&self) -> f64 {
        self.events.iter().map(|e| e.row.end).fold(0.0, f64::max)
    }

    /// Write the accepted rows, in seconds, as a paradigm table that loads
    /// back to the same events.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        for event in &self.events {
            csv.serialize(&event.row)?;
        }
        csv.flush()?;
        Ok(())
    }
}

/// Turns paradigm tables into [`Paradigm`]s against a fixed [`Mapping`].
#[derive(Debug, Clone)]
pub struct ParadigmLoader {
    mapping: Mapping,
    unit: TimeUnit,
    pwm: BTreeMap<String, f64>,
}

struct CandidateRow {
    line: u64,
    hardware: String,
    start: Option<f64>,
    end: Option<f64>,
    on: Option<f64>,
    off: Option<f64>,
    value: Option<f64>,
}

impl ParadigmLoader {
    pub fn new(mapping: Mapping) -> Self {
        Self {
            mapping,
            unit: TimeUnit::Seconds,
            pwm: BTreeMap::new(),
        }
    }

    /// Unit of the time columns in tables read from CSV.
    pub fn unit(mut self, unit: TimeUnit) -> Self {
        self.unit = unit;
        self
    }

    /// Default values for hardware whose rows leave `value` empty.
    pub fn pwm(mut self, pwm: &BTreeMap<String, f64>) -> Self {
        self.pwm = pwm
            .iter()
            .map(|(h, v)| (normalize_hardware(h), *v))
            .collect();
        self
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    /// Load a paradigm CSV from disk.
    pub fn load_path(&self, path: impl AsRef<Path>) -> Result<Paradigm> {
        let file = File::open(path.as_ref()).map_err(|e| {
            LearnMemError::Configuration(format!("{}: {}", path.as_ref().display(), e))
        })?;
        self.load_reader(file)
    }

    /// Load a paradigm CSV.
    pub fn load_reader<R: io::Read>(&self, reader: R) -> Result<Paradigm> {
        let mut csv = table_reader(reader);
        let headers = lowercase_headers(&mut csv)?;

        let hardware_col = column(&headers, &["hardware", "pin_id"]);
        let cols: Vec<Option<usize>> = ["start", "end", "on", "off"]
            .iter()
            .map(|name| column(&headers, &[name]))
            .collect();
        let missing: Vec<&str> = ["hardware", "start", "end", "on", "off"]
            .iter()
            .zip(std::iter::once(hardware_col).chain(cols.iter().copied()))
            .filter(|(_, c)| c.is_none())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(LearnMemError::Configuration(format!(
                "paradigm is missing required columns: {}",
                missing.join(", ")
            )));
        }
        let hardware_col = hardware_col.unwrap_or_default();
        let [start_col, end_col, on_col, off_col] =
            [cols[0], cols[1], cols[2], cols[3]].map(Option::unwrap_or_default);
        let value_col = column(&headers, &["value"]);

        let mut candidates = Vec::new();
        let mut skipped = Vec::new();
        for record in csv.records() {
            let record = record?;
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            let cell = |col: usize| decode_cell(record.get(col).unwrap_or_default());
            let decoded = (|| {
                Ok::<_, nom::error::Error<String>>(CandidateRow {
                    line,
                    hardware: record.get(hardware_col).unwrap_or_default().to_owned(),
                    start: cell(start_col)?,
                    end: cell(end_col)?,
                    on: cell(on_col)?,
                    off: cell(off_col)?,
                    value: match value_col {
                        Some(col) => cell(col)?,
                        None => None,
                    },
                })
            })();
            match decoded {
                Ok(candidate) => candidates.push(candidate),
                Err(e) => skipped.push(skip(line, format!("unreadable cell {:?}", e.input))),
            }
        }

        let factor = self.unit.seconds();
        let mut rows = Vec::new();
        for c in candidates {
            let (start, end) = match (c.start, c.end) {
                (Some(start), Some(end)) => (start, end),
                _ => {
                    skipped.push(skip(c.line, "start and end are required".to_owned()));
                    continue;
                }
            };
            let hardware = normalize_hardware(&c.hardware);
            let value = c
                .value
                .or_else(|| self.pwm.get(&hardware).copied())
                .unwrap_or(1.0);
            rows.push((
                c.line,
                HardwareEventRow {
                    hardware,
                    start: start * factor,
                    end: end * factor,
                    on: c.on.map(|on| on * factor),
                    off: c.off.map(|off| off * factor),
                    value,
                },
            ));
        }

        self.resolve(rows, skipped)
    }

    /// Load an in-memory table already expressed in seconds.
    pub fn load_rows(&self, rows: &[HardwareEventRow]) -> Result<Paradigm> {
        let rows = rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let mut row = row.clone();
                row.hardware = normalize_hardware(&row.hardware);
                (i as u64 + 1, row)
            })
            .collect();
        self.resolve(rows, Vec::new())
    }

    fn resolve(
        &self,
        rows: Vec<(u64, HardwareEventRow)>,
        mut skipped: Vec<SkippedRow>,
    ) -> Result<Paradigm> {
        let mut events = Vec::new();
        for (line, row) in rows {
            if let Some(reason) = row.problem() {
                skipped.push(skip(line, reason));
                continue;
            }
            let pin = self.mapping.resolve(&row.hardware).ok_or_else(|| {
                LearnMemError::Configuration(format!(
                    "hardware {} (line {}) is not available in the mapping",
                    row.hardware, line
                ))
            })?;
            events.push(ResolvedEvent {
                index: events.len(),
                row,
                pin,
            });
        }

        for s in &skipped {
            warn!("Ignoring paradigm row {}: {}", s.line, s.reason);
        }
        info!(
            "Paradigm loaded: {} events, {} rows ignored",
            events.len(),
            skipped.len()
        );
        Ok(Paradigm { events, skipped })
    }
}

fn skip(line: u64, reason: String) -> SkippedRow {
    SkippedRow { line, reason }
}

fn table_reader<R: io::Read>(reader: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .comment(Some(b'#'))
        .trim(Trim::All)
        .flexible(true)
        .from_reader(reader)
}

fn lowercase_headers<R: io::Read>(csv: &mut csv::Reader<R>) -> Result<StringRecord> {
    Ok(csv
        .headers()?
        .iter()
        .map(|h| h.to_ascii_lowercase())
        .collect())
}

fn column(headers: &StringRecord, names: &[&str]) -> Option<usize> {
    names
        .iter()
        .find_map(|name| headers.iter().position(|h| h == *name))
}
