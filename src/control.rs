//! Shared control signals for one extraction run
//!
//! `paused`, `stop` and `save_on_stop` are created fresh for every run and
//! handed to the coordinator and every worker through an `Arc`. Workers only
//! ever observe them at checkpoints; nothing is force-terminated.
//!
//! `abort` is internal: a failed chunk raises it so the remaining workers give
//! up early. It halts checkpoints like `stop` but is never a user stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Upper bound on a single wait while paused; wakeups normally come from the condvar
pub const PAUSE_RECHECK: Duration = Duration::from_millis(250);

#[derive(Debug, Default)]
pub struct ControlSignals {
    paused: Mutex<bool>,
    changed: Condvar,
    stop: AtomicBool,
    save_on_stop: AtomicBool,
    abort: AtomicBool,
}

/// What a worker should do after passing a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    Continue,
    Stop,
}

impl ControlSignals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the pause flag with poison recovery
    fn lock_paused(&self) -> MutexGuard<'_, bool> {
        match self.paused.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn pause(&self) {
        *self.lock_paused() = true;
        self.changed.notify_all();
    }

    pub fn resume(&self) {
        *self.lock_paused() = false;
        self.changed.notify_all();
    }

    /// Request a cooperative stop. `save` decides whether finished spill files
    /// are merged or discarded once the pool has drained.
    pub fn request_stop(&self, save: bool) {
        self.save_on_stop.store(save, Ordering::SeqCst);
        self.stop.store(true, Ordering::SeqCst);
        // Take the lock so a worker between its stop check and its wait cannot miss this
        let _guard = self.lock_paused();
        self.changed.notify_all();
    }

    /// Give up on the run after a chunk failure. Paused workers are released.
    pub fn abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
        let _guard = self.lock_paused();
        self.changed.notify_all();
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// Stop requested or run aborted; either way no new work starts
    pub fn is_halted(&self) -> bool {
        self.stop_requested() || self.is_aborted()
    }

    pub fn is_paused(&self) -> bool {
        *self.lock_paused()
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn save_on_stop(&self) -> bool {
        self.save_on_stop.load(Ordering::SeqCst)
    }

    /// Clear every signal
    pub fn reset(&self) {
        self.stop.store(false, Ordering::SeqCst);
        self.save_on_stop.store(false, Ordering::SeqCst);
        self.abort.store(false, Ordering::SeqCst);
        self.resume();
    }

    /// Block while paused. Returns early on a stop or an abort.
    pub fn wait_while_paused(&self) {
        let mut paused = self.lock_paused();
        while *paused && !self.is_halted() {
            paused = match self.changed.wait_timeout(paused, PAUSE_RECHECK) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Worker safety checkpoint: honor stop, then pause, then stop again in
    /// case it arrived while paused. An abort counts as a stop here.
    pub fn checkpoint(&self) -> Checkpoint {
        if self.is_halted() {
            return Checkpoint::Stop;
        }
        self.wait_while_paused();
        if self.is_halted() {
            Checkpoint::Stop
        } else {
            Checkpoint::Continue
        }
    }
}
