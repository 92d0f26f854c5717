//! Control surface for extraction runs
//!
//! An [`Extractor`] owns at most one active run at a time. Control calls are
//! safe from any thread; they only flip shared signals and the visible phase.

use crossbeam_channel::Receiver;
use log::{debug, warn};
use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crate::config::Settings;
use crate::control::ControlSignals;
use crate::error::{ExtractError, Result};
use crate::progress::{self, ProgressEvent, PROGRESS_CAPACITY};
use crate::runner::{run_extraction, RunOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Scanning,
    Planning,
    Running,
    Paused,
    Merging,
    Stopping,
    Saving,
    Discarding,
    Failing,
    Complete,
    Stopped,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Complete | Phase::Stopped | Phase::Failed)
    }

    /// True while a run owns the session
    pub fn is_active(self) -> bool {
        !self.is_terminal() && self != Phase::Idle
    }

    /// Past the point where the normal path can resume
    pub fn is_winding_down(self) -> bool {
        matches!(
            self,
            Phase::Stopping | Phase::Saving | Phase::Discarding | Phase::Failing
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Scanning => "scanning",
            Phase::Planning => "planning",
            Phase::Running => "running",
            Phase::Paused => "paused",
            Phase::Merging => "merging",
            Phase::Stopping => "stopping",
            Phase::Saving => "saving",
            Phase::Discarding => "discarding",
            Phase::Failing => "failing",
            Phase::Complete => "complete",
            Phase::Stopped => "stopped",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Shared, thread-safe view of the current phase
#[derive(Debug, Clone)]
pub struct PhaseCell(Arc<Mutex<Phase>>);

impl Default for PhaseCell {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseCell {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Phase::Idle)))
    }

    fn lock(&self) -> MutexGuard<'_, Phase> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn get(&self) -> Phase {
        *self.lock()
    }

    pub fn set(&self, phase: Phase) {
        let mut current = self.lock();
        debug!("Phase {} -> {}", *current, phase);
        *current = phase;
    }

    /// Move to `to` only if the current phase is one of `from`
    pub fn transition(&self, from: &[Phase], to: Phase) -> bool {
        let mut current = self.lock();
        if from.contains(&*current) {
            debug!("Phase {} -> {}", *current, to);
            *current = to;
            true
        } else {
            false
        }
    }

    /// Step along the normal path unless a stop or failure already took over
    pub fn advance(&self, to: Phase) -> bool {
        let mut current = self.lock();
        if current.is_winding_down() || current.is_terminal() {
            return false;
        }
        debug!("Phase {} -> {}", *current, to);
        *current = to;
        true
    }
}

/// Owner of the extraction lifecycle
pub struct Extractor {
    phases: PhaseCell,
    signals: Mutex<Arc<ControlSignals>>,
    handle: Mutex<Option<JoinHandle<Result<RunOutcome>>>>,
    progress_capacity: usize,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor {
    pub fn new() -> Self {
        Self {
            phases: PhaseCell::new(),
            signals: Mutex::new(Arc::new(ControlSignals::new())),
            handle: Mutex::new(None),
            progress_capacity: PROGRESS_CAPACITY,
        }
    }

    pub fn with_progress_capacity(mut self, capacity: usize) -> Self {
        self.progress_capacity = capacity;
        self
    }

    fn current_signals(&self) -> Arc<ControlSignals> {
        match self.signals.lock() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    fn lock_handle(&self) -> MutexGuard<'_, Option<JoinHandle<Result<RunOutcome>>>> {
        match self.handle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Validate `settings` and launch a run on a background thread.
    ///
    /// Rejected settings leave the session and the filesystem untouched.
    pub fn start(&self, settings: Settings) -> Result<Receiver<ProgressEvent>> {
        settings.validate()?;

        let mut handle = self.lock_handle();
        if self.phases.get().is_active() {
            return Err(ExtractError::AlreadyRunning);
        }
        if let Some(previous) = handle.take() {
            // Already finished; its outcome was not collected with wait()
            if previous.join().is_err() {
                warn!("Previous run thread panicked");
            }
        }

        self.phases.set(Phase::Idle);
        let signals = Arc::new(ControlSignals::new());
        match self.signals.lock() {
            Ok(mut guard) => *guard = Arc::clone(&signals),
            Err(poisoned) => *poisoned.into_inner() = Arc::clone(&signals),
        }

        let (sender, receiver) = progress::channel(self.progress_capacity);
        let phases = self.phases.clone();
        self.phases.set(Phase::Scanning);

        let spawned = thread::Builder::new()
            .name("epdsift-run".to_string())
            .spawn(move || run_extraction(&settings, &signals, &sender, &phases));

        match spawned {
            Ok(run) => {
                *handle = Some(run);
                Ok(receiver)
            }
            Err(e) => {
                self.phases.set(Phase::Failed);
                Err(e.into())
            }
        }
    }

    pub fn pause(&self) {
        self.current_signals().pause();
        self.phases.transition(&[Phase::Running], Phase::Paused);
    }

    pub fn resume(&self) {
        self.current_signals().resume();
        self.phases.transition(&[Phase::Paused], Phase::Running);
    }

    /// Request a cooperative stop of the active run. A run already merging
    /// its final output finishes normally.
    pub fn stop(&self, save: bool) {
        if !self.phases.get().is_active() {
            return;
        }
        self.current_signals().request_stop(save);
        self.phases.transition(
            &[
                Phase::Scanning,
                Phase::Planning,
                Phase::Running,
                Phase::Paused,
            ],
            Phase::Stopping,
        );
    }

    pub fn status(&self) -> Phase {
        self.phases.get()
    }

    /// Block until the current run ends and return its result.
    /// `None` when no run was started since the last `wait`.
    pub fn wait(&self) -> Option<Result<RunOutcome>> {
        let handle = self.lock_handle().take()?;
        match handle.join() {
            Ok(result) => Some(result),
            Err(_) => {
                self.phases.set(Phase::Failed);
                Some(Err(ExtractError::Io(io::Error::other(
                    "extraction thread panicked",
                ))))
            }
        }
    }
}

impl Drop for Extractor {
    fn drop(&mut self) {
        self.stop(false);
        if let Some(handle) = self.lock_handle().take() {
            let _ = handle.join();
        }
    }
}
