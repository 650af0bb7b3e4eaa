//! Cooperative cancellation shared by the scheduler, the tracker and the
//! process signal handlers.

use log::{info, warn};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

/// Set from the signal handler. Storing into an atomic is the only thing the
/// handler does, which keeps it async-signal-safe.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// A cloneable, idempotent stop request.
///
/// Clones share one flag. A [`CancelToken::child`] has a flag of its own but
/// also reports cancellation when any of its ancestors is cancelled, so one
/// component can be stopped without stopping its siblings.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    ancestors: Vec<Arc<AtomicBool>>,
}

impl CancelToken {
    /// A fresh token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// A token cancelled by its own `cancel` or by any of its ancestors'.
    pub fn child(&self) -> Self {
        let mut ancestors = self.ancestors.clone();
        ancestors.push(self.flag.clone());
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            ancestors,
        }
    }

    /// Request a stop. Calling this more than once is harmless.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether a stop has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self.ancestors.iter().any(|f| f.load(Ordering::SeqCst))
    }
}

extern "C" fn on_interrupt(_signum: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Route SIGINT and SIGTERM to `token`.
///
/// The handler itself only flips a static flag; a small watcher thread polls
/// that flag and cancels the token from ordinary thread context. The watcher
/// exits once the token is cancelled, whoever cancelled it.
pub fn install_interrupt_handler(token: CancelToken) -> JoinHandle<()> {
    let handler = on_interrupt as extern "C" fn(libc::c_int) as libc::sighandler_t;
    for signum in [libc::SIGINT, libc::SIGTERM] {
        // SAFETY: `on_interrupt` only performs an atomic store.
        let previous = unsafe { libc::signal(signum, handler) };
        if previous == libc::SIG_ERR {
            warn!("Could not install a handler for signal {}", signum);
        }
    }

    thread::spawn(move || {
        while !token.is_cancelled() {
            if INTERRUPTED.load(Ordering::SeqCst) {
                info!("Interrupt received, stopping");
                token.cancel();
                break;
            }
            thread::sleep(Duration::from_millis(50));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn children_follow_their_parent_but_not_each_other() {
        let root = CancelToken::new();
        let scheduler = root.child();
        let tracker = root.child();
        let event = scheduler.child();

        scheduler.cancel();
        assert!(event.is_cancelled());
        assert!(!tracker.is_cancelled());
        assert!(!root.is_cancelled());

        root.cancel();
        assert!(tracker.is_cancelled());
    }

    #[test]
    fn watcher_exits_when_token_is_cancelled_elsewhere() {
        let token = CancelToken::new();
        let watcher = install_interrupt_handler(token.clone());
        token.cancel();
        assert!(watcher.join().is_ok());
    }
}
