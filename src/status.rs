//! Lifecycle state shared by the long-running parts of the system, and the
//! two small capability traits they are wired together through.

use std::{
    fmt,
    sync::Mutex,
    time::{Duration, Instant},
};

/// Where a [`Runnable`] is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Nothing loaded yet.
    Idle,
    /// Loaded and built, waiting for `start`.
    Ready,
    /// Started and not yet stopped.
    Running,
    /// Stopped, either on request or because the work ran out.
    Stopped,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Idle => "idle",
            Status::Ready => "ready",
            Status::Running => "running",
            Status::Stopped => "stopped",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug)]
struct StatusInner {
    status: Status,
    time_zero: Option<Instant>,
    stopped_at: Option<Instant>,
}

/// A thread-safe [`Status`] holder that also remembers when the owner
/// started running. `Stopped` is sticky until [`StatusCell::reset`].
#[derive(Debug)]
pub struct StatusCell {
    inner: Mutex<StatusInner>,
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusCell {
    /// A new cell in the `Idle` state.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StatusInner {
                status: Status::Idle,
                time_zero: None,
                stopped_at: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StatusInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The current status.
    pub fn get(&self) -> Status {
        self.lock().status
    }

    /// Mark as ready, unless already running or stopped.
    pub fn ready(&self) {
        let mut inner = self.lock();
        if inner.status == Status::Idle {
            inner.status = Status::Ready;
        }
    }

    /// Mark as running from `time_zero`. Returns false if it already was.
    pub fn run(&self, time_zero: Instant) -> bool {
        let mut inner = self.lock();
        match inner.status {
            Status::Running | Status::Stopped => false,
            Status::Idle | Status::Ready => {
                inner.status = Status::Running;
                inner.time_zero = Some(time_zero);
                true
            }
        }
    }

    /// Mark as stopped. Returns false if it already was.
    pub fn stop(&self) -> bool {
        let mut inner = self.lock();
        if inner.status == Status::Stopped {
            return false;
        }
        inner.status = Status::Stopped;
        inner.stopped_at = Some(Instant::now());
        true
    }

    /// Back to `Idle`, forgetting the time zero.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.status = Status::Idle;
        inner.time_zero = None;
        inner.stopped_at = None;
    }

    /// When `run` was called, if it was.
    pub fn time_zero(&self) -> Option<Instant> {
        self.lock().time_zero
    }

    /// Wall time spent running. Frozen once stopped.
    pub fn elapsed(&self) -> Option<Duration> {
        let inner = self.lock();
        let time_zero = inner.time_zero?;
        let until = inner.stopped_at.unwrap_or_else(Instant::now);
        Some(until.saturating_duration_since(time_zero))
    }
}

/// Something that can be started and stopped as one unit.
pub trait Runnable {
    /// Begin work. Calling this on something already running is a no-op.
    fn start(&mut self);

    /// Stop work and release resources. Safe to call in any state, any
    /// number of times.
    fn stop(&mut self);

    /// Current lifecycle state.
    fn status(&self) -> Status;
}

/// Named numeric settings a module exposes to whoever drives it.
///
/// Only existing keys can be changed; unknown keys are ignored rather than
/// added.
pub trait SettingsBridge {
    /// Read a setting.
    fn get(&self, key: &str) -> Option<f64>;

    /// Write a setting. Returns whether `key` was recognised and accepted.
    fn set(&mut self, key: &str, value: f64) -> bool;

    /// The keys this module understands.
    fn keys(&self) -> &'static [&'static str];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_transitions() {
        let cell = StatusCell::new();
        assert_eq!(cell.get(), Status::Idle);
        assert!(cell.elapsed().is_none());

        cell.ready();
        assert_eq!(cell.get(), Status::Ready);

        assert!(cell.run(Instant::now()));
        assert!(!cell.run(Instant::now()));
        assert_eq!(cell.get(), Status::Running);

        assert!(cell.stop());
        assert!(!cell.stop());
        assert_eq!(cell.get(), Status::Stopped);

        // ready() never rewinds a stopped cell
        cell.ready();
        assert_eq!(cell.get(), Status::Stopped);
    }

    #[test]
    fn elapsed_freezes_after_stop() {
        let cell = StatusCell::new();
        cell.run(Instant::now() - Duration::from_secs(2));
        cell.stop();
        let first = cell.elapsed().unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cell.elapsed().unwrap(), first);
        assert!(first >= Duration::from_secs(2));
    }
}
