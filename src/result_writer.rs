//! Where tracker positions and controller events end up.
//!
//! A [`ResultSink`] receives [`ResultRow`]s from the tracker loop and from
//! every hardware channel. [`CsvResultWriter`] keeps one CSV table per row
//! kind and appends to it in batches; [`MemorySink`] simply keeps everything.

use crate::error::Result;

use log::{debug, info};
use std::{
    collections::BTreeMap,
    fs::{self, File},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

/// One fly position, relative to its arena's center.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionRecord {
    pub frame_index: u64,
    pub timestamp: f64,
    pub arena_identity: usize,
    pub x: f64,
    pub y: f64,
    pub pin_state: BTreeMap<String, f64>,
}

/// The pin state right after one channel changed.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerEventRecord {
    pub timestamp: f64,
    pub pin_state: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResultRow {
    Position(PositionRecord),
    ControllerEvent(ControllerEventRecord),
}

impl ResultRow {
    fn table(&self) -> TableKind {
        match self {
            ResultRow::Position(_) => TableKind::Positions,
            ResultRow::ControllerEvent(_) => TableKind::ControllerEvents,
        }
    }

    fn pin_state(&self) -> &BTreeMap<String, f64> {
        match self {
            ResultRow::Position(p) => &p.pin_state,
            ResultRow::ControllerEvent(c) => &c.pin_state,
        }
    }

    fn fixed_fields(&self) -> Vec<String> {
        match self {
            ResultRow::Position(p) => vec![
                p.frame_index.to_string(),
                format!("{:.4}", p.timestamp),
                p.arena_identity.to_string(),
                format!("{:.2}", p.x),
                format!("{:.2}", p.y),
            ],
            ResultRow::ControllerEvent(c) => vec![format!("{:.4}", c.timestamp)],
        }
    }
}

/// Receives rows for persistence. One writer at a time.
pub trait ResultSink: Send {
    fn write(&mut self, row: &ResultRow) -> Result<()>;

    /// Push everything buffered so far to its destination.
    fn flush(&mut self) -> Result<()>;
}

/// A sink shared by the tracker and the event threads.
pub type SharedSink = Arc<Mutex<dyn ResultSink>>;

/// Wrap a sink so it can be shared across threads.
pub fn shared<S: ResultSink + 'static>(sink: S) -> SharedSink {
    Arc::new(Mutex::new(sink))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum TableKind {
    Positions,
    ControllerEvents,
}

impl TableKind {
    fn suffix(self) -> &'static str {
        match self {
            TableKind::Positions => "POSITIONS",
            TableKind::ControllerEvents => "CONTROLLER_EVENTS",
        }
    }

    fn fixed_columns(self) -> &'static [&'static str] {
        match self {
            TableKind::Positions => &["frame_index", "t", "arena", "x", "y"],
            TableKind::ControllerEvents => &["t"],
        }
    }
}

#[derive(Debug)]
struct Table {
    path: PathBuf,
    pins: Option<Vec<String>>,
    cache: Vec<Vec<String>>,
    writer: Option<csv::Writer<File>>,
}

impl Table {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            pins: None,
            cache: Vec::new(),
            writer: None,
        }
    }

    fn push(&mut self, row: &ResultRow) {
        let pins = self
            .pins
            .get_or_insert_with(|| row.pin_state().keys().cloned().collect());
        let mut record = row.fixed_fields();
        record.extend(pins.iter().map(|pin| {
            row.pin_state()
                .get(pin)
                .map(|v| v.to_string())
                .unwrap_or_default()
        }));
        self.cache.push(record);
    }

    fn append(&mut self, kind: TableKind) -> Result<()> {
        if self.cache.is_empty() {
            return Ok(());
        }
        if self.writer.is_none() {
            let mut writer = csv::Writer::from_path(&self.path)?;
            let mut header: Vec<&str> = kind.fixed_columns().to_vec();
            if let Some(pins) = &self.pins {
                header.extend(pins.iter().map(String::as_str));
            }
            writer.write_record(&header)?;
            info!("Writing {}", self.path.display());
            self.writer = Some(writer);
        }
        if let Some(writer) = self.writer.as_mut() {
            for record in self.cache.drain(..) {
                writer.write_record(&record)?;
            }
            writer.flush()?;
        }
        Ok(())
    }
}

/// Appends rows to `<prefix>_POSITIONS.csv` and
/// `<prefix>_CONTROLLER_EVENTS.csv` inside a results directory.
///
/// Rows are cached and appended every `max_rows_cached` rows per table, and
/// on [`ResultSink::flush`]. The header of each table is fixed by its first
/// row, pin-state columns in name order.
#[derive(Debug)]
pub struct CsvResultWriter {
    dir: PathBuf,
    prefix: String,
    max_rows_cached: usize,
    tables: BTreeMap<TableKind, Table>,
}

impl CsvResultWriter {
    /// Create the results directory if needed.
    pub fn new(dir: impl AsRef<Path>, prefix: &str, max_rows_cached: usize) -> Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            prefix: prefix.to_owned(),
            max_rows_cached: max_rows_cached.max(1),
            tables: BTreeMap::new(),
        })
    }

    fn path_for(&self, kind: TableKind) -> PathBuf {
        self.dir
            .join(format!("{}_{}.csv", self.prefix, kind.suffix()))
    }

    /// Path of the positions table.
    pub fn positions_path(&self) -> PathBuf {
        self.path_for(TableKind::Positions)
    }

    /// Path of the controller events table.
    pub fn controller_events_path(&self) -> PathBuf {
        self.path_for(TableKind::ControllerEvents)
    }
}

impl ResultSink for CsvResultWriter {
    fn write(&mut self, row: &ResultRow) -> Result<()> {
        let kind = row.table();
        let path = self.path_for(kind);
        let table = self.tables.entry(kind).or_insert_with(|| Table::new(path));
        table.push(row);
        if table.cache.len() >= self.max_rows_cached {
            table.append(kind)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        for (kind, table) in self.tables.iter_mut() {
            table.append(*kind)?;
        }
        debug!("CsvResultWriter : flushed");
        Ok(())
    }
}

/// Keeps every row in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    rows: Arc<Mutex<Vec<ResultRow>>>,
    flushes: Arc<Mutex<usize>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<ResultRow> {
        self.rows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn positions(&self) -> Vec<PositionRecord> {
        self.rows()
            .into_iter()
            .filter_map(|row| match row {
                ResultRow::Position(p) => Some(p),
                ResultRow::ControllerEvent(_) => None,
            })
            .collect()
    }

    pub fn controller_events(&self) -> Vec<ControllerEventRecord> {
        self.rows()
            .into_iter()
            .filter_map(|row| match row {
                ResultRow::ControllerEvent(c) => Some(c),
                ResultRow::Position(_) => None,
            })
            .collect()
    }

    /// How many times the sink was flushed.
    pub fn flushes(&self) -> usize {
        *self
            .flushes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ResultSink for MemorySink {
    fn write(&mut self, row: &ResultRow) -> Result<()> {
        self.rows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(row.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        *self
            .flushes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pins(led: f64, shock: f64) -> BTreeMap<String, f64> {
        [("LED".to_owned(), led), ("SHOCK".to_owned(), shock)]
            .into_iter()
            .collect()
    }

    fn position(frame_index: u64, arena_identity: usize) -> ResultRow {
        ResultRow::Position(PositionRecord {
            frame_index,
            timestamp: frame_index as f64 / 2.0,
            arena_identity,
            x: 1.5,
            y: -2.0,
            pin_state: pins(0.0, 1.0),
        })
    }

    #[test]
    fn writes_one_table_per_row_kind() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CsvResultWriter::new(dir.path(), "run1", 100).unwrap();
        writer.write(&position(0, 1)).unwrap();
        writer.write(&position(0, 2)).unwrap();
        writer
            .write(&ResultRow::ControllerEvent(ControllerEventRecord {
                timestamp: 0.25,
                pin_state: pins(1.0, 0.0),
            }))
            .unwrap();

        // nothing reaches disk before the cache fills or a flush
        assert!(!writer.positions_path().exists());
        writer.flush().unwrap();

        let positions = fs::read_to_string(writer.positions_path()).unwrap();
        let lines: Vec<&str> = positions.lines().collect();
        assert_eq!(lines[0], "frame_index,t,arena,x,y,LED,SHOCK");
        assert_eq!(lines[2], "0,0.0000,2,1.50,-2.00,0,1");
        assert_eq!(lines.len(), 3);

        let events = fs::read_to_string(writer.controller_events_path()).unwrap();
        assert_eq!(events.lines().nth(1), Some("0.2500,1,0"));
    }

    #[test]
    fn full_cache_is_appended_without_flush() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CsvResultWriter::new(dir.path(), "cached", 2).unwrap();
        writer.write(&position(0, 1)).unwrap();
        writer.write(&position(1, 1)).unwrap();
        writer.write(&position(2, 1)).unwrap();

        let positions = fs::read_to_string(writer.positions_path()).unwrap();
        assert_eq!(positions.lines().count(), 3);

        writer.flush().unwrap();
        let positions = fs::read_to_string(writer.positions_path()).unwrap();
        assert_eq!(positions.lines().count(), 4);
    }

    #[test]
    fn memory_sink_splits_rows() {
        let mut sink = MemorySink::new();
        let reader = sink.clone();
        sink.write(&position(3, 1)).unwrap();
        sink.flush().unwrap();
        assert_eq!(reader.positions()[0].frame_index, 3);
        assert!(reader.controller_events().is_empty());
        assert_eq!(reader.flushes(), 1);
    }
}
