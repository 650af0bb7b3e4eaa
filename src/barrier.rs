//! Rendezvous points for events that share a timestamp.
//!
//! Every distinct start or end time in a schedule gets one [`Rendezvous`]
//! whose party count is the number of rows starting or ending there. The
//! start of one row and the end of another at the same instant meet at the
//! same barrier.

use crate::cancel::CancelToken;

use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Condvar, Mutex},
    time::Duration,
};

/// How often a blocked party rechecks its cancel token.
const CANCEL_POLL: Duration = Duration::from_millis(20);

/// Timestamps closer than a millisecond share a barrier.
pub fn quantize(seconds: f64) -> i64 {
    (seconds * 1000.0).round() as i64
}

/// Returned by [`Rendezvous::wait`] when the barrier was aborted, or the
/// waiter's token cancelled, before every party arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aborted;

impl fmt::Display for Aborted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "barrier aborted")
    }
}

impl std::error::Error for Aborted {}

#[derive(Debug)]
struct BarrierState {
    arrived: usize,
    generation: u64,
    aborted: bool,
}

/// A reusable barrier that can be aborted.
#[derive(Debug)]
pub struct Rendezvous {
    parties: usize,
    state: Mutex<BarrierState>,
    released: Condvar,
}

impl Rendezvous {
    pub fn new(parties: usize) -> Self {
        Self {
            parties: parties.max(1),
            state: Mutex::new(BarrierState {
                arrived: 0,
                generation: 0,
                aborted: false,
            }),
            released: Condvar::new(),
        }
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Block until every party has arrived. Returns `Ok(true)` for the party
    /// that completed the rendezvous.
    pub fn wait(&self, cancel: &CancelToken) -> Result<bool, Aborted> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if state.aborted {
            return Err(Aborted);
        }

        state.arrived += 1;
        if state.arrived == self.parties {
            state.arrived = 0;
            state.generation += 1;
            self.released.notify_all();
            return Ok(true);
        }

        let generation = state.generation;
        loop {
            let (next, _) = self
                .released
                .wait_timeout(state, CANCEL_POLL)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            state = next;
            if state.generation != generation {
                return Ok(false);
            }
            if state.aborted {
                return Err(Aborted);
            }
            if cancel.is_cancelled() {
                state.arrived -= 1;
                return Err(Aborted);
            }
        }
    }

    /// Release every waiter with [`Aborted`]. Later waits fail immediately.
    pub fn abort(&self) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.aborted = true;
        self.released.notify_all();
    }

    pub fn is_aborted(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .aborted
    }
}

/// One [`Rendezvous`] per distinct start or end time of a schedule.
#[derive(Debug, Default)]
pub struct BarrierSet {
    barriers: BTreeMap<i64, Arc<Rendezvous>>,
}

impl BarrierSet {
    /// Build from the `(start, end)` window of every event.
    pub fn from_windows<I>(windows: I) -> Self
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut parties: BTreeMap<i64, usize> = BTreeMap::new();
        for (start, end) in windows {
            *parties.entry(quantize(start)).or_default() += 1;
            *parties.entry(quantize(end)).or_default() += 1;
        }
        let barriers = parties
            .into_iter()
            .map(|(t, n)| (t, Arc::new(Rendezvous::new(n))))
            .collect();
        Self { barriers }
    }

    /// The barrier for time `t`, if any row starts or ends there.
    pub fn get(&self, t: f64) -> Option<Arc<Rendezvous>> {
        self.barriers.get(&quantize(t)).cloned()
    }

    /// Party count of the barrier at `t`, 0 if there is none.
    pub fn parties(&self, t: f64) -> usize {
        self.barriers
            .get(&quantize(t))
            .map(|b| b.parties())
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.barriers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.barriers.is_empty()
    }

    /// Release everyone waiting anywhere in the set.
    pub fn abort_all(&self) {
        self.barriers.values().for_each(|b| b.abort());
    }
}
