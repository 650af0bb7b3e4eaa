//! Terminal front ends: the serial device picker and the run monitor.

mod device_selector;
mod error;
mod monitor;

pub use device_selector::device_selector;
pub use error::GuiError;
pub use monitor::{monitor, MonitorSnapshot};
