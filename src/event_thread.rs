//! One timer per paradigm row.
//!
//! An [`EventThread`] waits until its start time, meets the other events
//! starting with it at their shared barrier, turns its channel on (once, or as
//! a duty-cycled wave), waits until its end time, turns the channel off and
//! meets the events ending with it. Waiting is a cooperative poll at the
//! schedule's sampling rate, so transitions can lag by up to one sampling
//! period.

use crate::barrier::Rendezvous;
use crate::board::PinNumber;
use crate::cancel::CancelToken;
use crate::channel::HardwareChannel;
use crate::clock::Clock;

use log::{debug, info, warn};
use std::{
    sync::{Arc, Condvar, Mutex},
    time::Duration,
};

/// How a row drives its channel while it is active.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventKind {
    /// Hold the value for the whole window.
    Plain,
    /// Alternate `value` for `on` seconds and 0 for `off` seconds, at most
    /// `n_iters` times.
    Wave { on: f64, off: f64, n_iters: u64 },
}

impl EventKind {
    /// The kind of a row active over `[start, end)` with an optional duty
    /// cycle. `end` must already be bounded by the schedule duration.
    pub fn for_window(start: f64, end: f64, duty_cycle: Option<(f64, f64)>) -> Self {
        match duty_cycle {
            None => EventKind::Plain,
            Some((on, off)) => {
                let period = on + off;
                let n_iters = if period > 0.0 {
                    ((end - start) / period).floor().max(0.0) as u64
                } else {
                    0
                };
                EventKind::Wave { on, off, n_iters }
            }
        }
    }
}

/// Everything an event thread needs to know about its row.
#[derive(Debug, Clone, PartialEq)]
pub struct EventSpec {
    pub index: usize,
    pub hardware: String,
    pub pin: PinNumber,
    pub start: f64,
    /// Already bounded by the schedule duration.
    pub end: f64,
    pub value: f64,
    pub kind: EventKind,
}

/// Counts down as event threads finish.
#[derive(Debug)]
pub struct Completion {
    remaining: Mutex<usize>,
    finished: Condvar,
}

impl Completion {
    pub fn new(count: usize) -> Self {
        Self {
            remaining: Mutex::new(count),
            finished: Condvar::new(),
        }
    }

    /// Mark one thread done. Returns true for the last one.
    pub fn done(&self) -> bool {
        let mut remaining = self
            .remaining
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            self.finished.notify_all();
            true
        } else {
            false
        }
    }

    pub fn remaining(&self) -> usize {
        *self
            .remaining
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Block until every thread is done, or `timeout` passes. Returns whether
    /// every thread is done.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let remaining = self
            .remaining
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let (remaining, _) = self
            .finished
            .wait_timeout_while(remaining, timeout, |r| *r > 0)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *remaining == 0
    }

    /// Block until every thread is done.
    pub fn wait(&self) {
        let remaining = self
            .remaining
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let _done = self
            .finished
            .wait_while(remaining, |r| *r > 0)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
    }
}

/// How a run of an event thread ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Ran through its end barrier.
    Completed,
    /// Cancelled, or released from a barrier by an abort.
    Cancelled,
}

enum Wait {
    Reached,
    Cancelled,
}

/// A row bound to its channel, barriers and the schedule's clock.
pub struct EventThread {
    spec: EventSpec,
    channel: HardwareChannel,
    start_barrier: Arc<Rendezvous>,
    end_barrier: Arc<Rendezvous>,
    clock: Clock,
    cancel: CancelToken,
    poll: Duration,
    completion: Arc<Completion>,
}

impl EventThread {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        spec: EventSpec,
        channel: HardwareChannel,
        start_barrier: Arc<Rendezvous>,
        end_barrier: Arc<Rendezvous>,
        clock: Clock,
        cancel: CancelToken,
        poll: Duration,
        completion: Arc<Completion>,
    ) -> Self {
        Self {
            spec,
            channel,
            start_barrier,
            end_barrier,
            clock,
            cancel,
            poll,
            completion,
        }
    }

    pub fn spec(&self) -> &EventSpec {
        &self.spec
    }

    fn name(&self) -> String {
        format!("{}#{}", self.spec.hardware, self.spec.index)
    }

    /// Run to completion or cancellation. The channel is always left at 0.
    pub fn run(self) -> Outcome {
        let outcome = self.execute();
        if outcome == Outcome::Cancelled {
            self.write(0.0);
        }
        self.completion.done();
        info!("{} : terminated.", self.name());
        outcome
    }

    fn execute(&self) -> Outcome {
        if let Wait::Cancelled = self.wait_until(self.spec.start) {
            return Outcome::Cancelled;
        }
        let late = self.clock.elapsed() - self.spec.start;
        if late > 2.0 * self.poll.as_secs_f64() {
            warn!("{} : started {:.3}s late", self.name(), late);
        }
        if self.start_barrier.wait(&self.cancel).is_err() {
            return Outcome::Cancelled;
        }

        let active = match self.spec.kind {
            EventKind::Plain => {
                self.write(self.spec.value);
                self.wait_until(self.spec.end)
            }
            EventKind::Wave { on, off, n_iters } => self.wave(on, off, n_iters),
        };
        if let Wait::Cancelled = active {
            return Outcome::Cancelled;
        }

        self.write(0.0);
        match self.end_barrier.wait(&self.cancel) {
            Ok(_) => Outcome::Completed,
            Err(_) => Outcome::Cancelled,
        }
    }

    /// Cycle on and off, then hold off until the end of the window.
    fn wave(&self, on: f64, off: f64, n_iters: u64) -> Wait {
        let period = on + off;
        for k in 0..n_iters {
            let cycle_start = self.spec.start + k as f64 * period;
            if cycle_start >= self.spec.end {
                break;
            }
            self.write(self.spec.value);
            if let Wait::Cancelled = self.wait_until((cycle_start + on).min(self.spec.end)) {
                return Wait::Cancelled;
            }
            self.write(0.0);
            if let Wait::Cancelled = self.wait_until((cycle_start + period).min(self.spec.end)) {
                return Wait::Cancelled;
            }
        }
        self.wait_until(self.spec.end)
    }

    /// Poll the clock until it reads at least `t` seconds.
    fn wait_until(&self, t: f64) -> Wait {
        loop {
            if self.cancel.is_cancelled() {
                return Wait::Cancelled;
            }
            let remaining = t - self.clock.elapsed();
            if remaining <= 0.0 {
                return Wait::Reached;
            }
            let nap = if self.clock.is_external() {
                self.poll
            } else {
                self.poll.min(Duration::from_secs_f64(remaining))
            };
            spin_sleep::sleep(nap);
        }
    }

    /// A failed write only concerns this channel.
    fn write(&self, value: f64) {
        match self.channel.write(value) {
            Ok(()) => debug!("{} : {:.3}", self.name(), value),
            Err(e) => warn!("{} : write of {} failed: {}", self.name(), value, e),
        }
    }
}
