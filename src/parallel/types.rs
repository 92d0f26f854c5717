//! Type definitions for parallel extraction
//!
//! Contains the shared worker context, per-chunk outcomes and the report the
//! coordinator hands back to the runner.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::FilterCriteria;
use crate::control::ControlSignals;

/// Everything a worker needs besides the chunk itself, shared read-only
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub input: PathBuf,
    pub spill_dir: PathBuf,
    pub criteria: FilterCriteria,
    pub signals: Arc<ControlSignals>,
}

/// Result of one chunk that ran to completion or was cut short by a stop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkOutcome {
    pub chunk_id: usize,
    pub spill_path: PathBuf,
    pub records_read: usize,
    pub records_kept: usize,
    pub lines_written: usize,
    pub stopped_early: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFailure {
    pub chunk_id: usize,
    pub message: String,
}

/// Message type sent from workers back to the coordinator
#[derive(Debug)]
pub(crate) enum TaskResult {
    Done(ChunkOutcome),
    Failed(ChunkFailure),
}

/// What the coordinator observed once every worker has exited
#[derive(Debug, Default)]
pub struct PoolReport {
    pub outcomes: Vec<ChunkOutcome>,
    pub failures: Vec<ChunkFailure>,
    pub chunks_total: usize,
    pub records_read: usize,
    pub stopped: bool,
}

impl PoolReport {
    /// Spill files of tasks that returned successfully, in chunk order
    pub fn spill_paths(&self) -> Vec<PathBuf> {
        let mut outcomes: Vec<&ChunkOutcome> = self.outcomes.iter().collect();
        outcomes.sort_by_key(|outcome| outcome.chunk_id);
        outcomes
            .into_iter()
            .map(|outcome| outcome.spill_path.clone())
            .collect()
    }

    pub fn records_kept(&self) -> usize {
        self.outcomes.iter().map(|o| o.records_kept).sum()
    }

    /// Lines flushed to spill files, before cross-chunk dedup
    pub fn lines_spilled(&self) -> usize {
        self.outcomes.iter().map(|o| o.lines_written).sum()
    }

    /// Chunks that returned early because of a stop
    pub fn chunks_cut_short(&self) -> usize {
        self.outcomes.iter().filter(|o| o.stopped_early).count()
    }
}
