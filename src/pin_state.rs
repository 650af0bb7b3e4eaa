//! The live hardware-name to output-value table.
//!
//! Each event thread writes only the key of the hardware it drives; the
//! tracker and the monitor only ever read snapshots.

use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};

/// Shared, thread-safe pin state. Cloning gives another handle onto the same
/// table.
#[derive(Debug, Clone, Default)]
pub struct PinState {
    values: Arc<RwLock<BTreeMap<String, f64>>>,
}

impl PinState {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// A table with every hardware name present and set to 0.
    pub fn with_hardware<I, S>(hardware: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = hardware.into_iter().map(|h| (h.into(), 0.0)).collect();
        Self {
            values: Arc::new(RwLock::new(values)),
        }
    }

    /// Record the value last written to `hardware`.
    pub fn set(&self, hardware: &str, value: f64) {
        let mut values = self
            .values
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match values.get_mut(hardware) {
            Some(current) => *current = value,
            None => {
                values.insert(hardware.to_owned(), value);
            }
        }
    }

    /// The value last written to `hardware`.
    pub fn get(&self, hardware: &str) -> Option<f64> {
        self.values
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(hardware)
            .copied()
    }

    /// A copy of the whole table, ordered by hardware name.
    pub fn snapshot(&self) -> BTreeMap<String, f64> {
        self.values
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Set every known key to 0.
    pub fn zero_all(&self) {
        let mut values = self
            .values
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        values.values_mut().for_each(|v| *v = 0.0);
    }
}
