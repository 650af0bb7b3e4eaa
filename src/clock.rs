//! The schedule's notion of "now", in seconds since time zero.
//!
//! A wall clock free-runs from the instant it is started. A ticked clock only
//! moves when [`Clock::tick`] is called, for replaying recordings against
//! their own timestamps.

use log::warn;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Instant,
};

#[derive(Debug)]
enum Source {
    Wall(Mutex<Option<Instant>>),
    Ticked(AtomicU64),
}

/// A cloneable handle onto one clock.
#[derive(Debug, Clone)]
pub struct Clock {
    source: Arc<Source>,
}

impl Default for Clock {
    fn default() -> Self {
        Self::wall()
    }
}

impl Clock {
    /// A clock that follows wall time once started.
    pub fn wall() -> Self {
        Self {
            source: Arc::new(Source::Wall(Mutex::new(None))),
        }
    }

    /// A clock that only advances through [`Clock::tick`].
    pub fn ticked() -> Self {
        Self {
            source: Arc::new(Source::Ticked(AtomicU64::new(0f64.to_bits()))),
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(*self.source, Source::Ticked(_))
    }

    /// Set time zero. Only meaningful for wall clocks.
    pub fn start(&self, t0: Instant) {
        if let Source::Wall(zero) = &*self.source {
            *zero.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(t0);
        }
    }

    /// Seconds since time zero. A wall clock that was never started reads 0.
    pub fn elapsed(&self) -> f64 {
        match &*self.source {
            Source::Wall(zero) => zero
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .map(|t0| t0.elapsed().as_secs_f64())
                .unwrap_or(0.0),
            Source::Ticked(bits) => f64::from_bits(bits.load(Ordering::SeqCst)),
        }
    }

    /// Move a ticked clock to `elapsed` seconds. Returns false, and does
    /// nothing, on a wall clock.
    pub fn tick(&self, elapsed: f64) -> bool {
        match &*self.source {
            Source::Wall(_) => {
                warn!("Ignoring tick({}) on a wall clock", elapsed);
                false
            }
            Source::Ticked(bits) => {
                bits.store(elapsed.to_bits(), Ordering::SeqCst);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn wall_clock_reads_zero_until_started() {
        let clock = Clock::wall();
        assert_eq!(clock.elapsed(), 0.0);
        clock.start(Instant::now() - Duration::from_secs(3));
        assert!(clock.elapsed() >= 3.0);
        assert!(!clock.tick(10.0));
    }

    #[test]
    fn ticked_clock_moves_only_on_tick() {
        let clock = Clock::ticked();
        let reader = clock.clone();
        clock.start(Instant::now() - Duration::from_secs(3));
        assert_eq!(reader.elapsed(), 0.0);
        assert!(clock.tick(1.5));
        assert_eq!(reader.elapsed(), 1.5);
        assert!(reader.is_external());
    }
}
