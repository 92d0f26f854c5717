//! Worker pool coordinator
//!
//! Queues every chunk up front, runs a fixed set of worker threads and polls
//! for completions, translating them and pause transitions into progress
//! events.

use crossbeam_channel::{unbounded, RecvTimeoutError};
use log::{debug, info, warn};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::Result;
use crate::planner::Chunk;
use crate::progress::{percent, ProgressEvent, ProgressSender};
use crate::session::{Phase, PhaseCell};

use super::types::{PoolReport, TaskResult, WorkerContext};
use super::worker::worker_thread;

/// Default interval between coordinator checks of the control signals
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct WorkerPool {
    workers: usize,
    poll_interval: Duration,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run every chunk to completion (or until a stop), returning what arrived.
    /// Failures are collected, not acted upon; the caller decides the policy.
    pub fn run(
        &self,
        chunks: &[Chunk],
        ctx: WorkerContext,
        total_records: usize,
        progress: &ProgressSender,
        phases: &PhaseCell,
    ) -> Result<PoolReport> {
        let mut report = PoolReport {
            chunks_total: chunks.len(),
            ..Default::default()
        };

        let (task_sender, task_receiver) = unbounded();
        for chunk in chunks {
            if task_sender.send(*chunk).is_err() {
                break;
            }
        }
        drop(task_sender);

        let (result_sender, result_receiver) = unbounded();
        let ctx = Arc::new(ctx);
        let signals = Arc::clone(&ctx.signals);

        let thread_count = self.workers.min(chunks.len().max(1));
        let mut handles = Vec::with_capacity(thread_count);
        for worker_id in 0..thread_count {
            let worker_tasks = task_receiver.clone();
            let worker_results = result_sender.clone();
            let worker_ctx = Arc::clone(&ctx);

            let spawned = thread::Builder::new()
                .name(format!("epdsift-worker-{}", worker_id))
                .spawn(move || worker_thread(worker_id, worker_tasks, worker_results, &worker_ctx));

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    // Leave nothing for the workers already running, then wait for them
                    while task_receiver.try_recv().is_ok() {}
                    drop(result_sender);
                    drop(result_receiver);
                    join_workers(handles);
                    return Err(e.into());
                }
            }
        }
        drop(task_receiver);
        // Drop our sender so the channel disconnects once every worker exits
        drop(result_sender);
        debug!("Started {} worker(s) for {} chunk(s)", handles.len(), chunks.len());

        let mut was_paused = false;
        let mut stop_seen = false;
        loop {
            if !stop_seen && signals.is_halted() {
                stop_seen = true;
                if signals.stop_requested() {
                    info!("Stop requested, waiting for workers to reach a checkpoint");
                } else {
                    info!("Chunk failed, abandoning the remaining chunks");
                }
            }

            let paused = signals.is_paused();
            if !stop_seen && paused != was_paused {
                was_paused = paused;
                let done = percent(report.records_read, total_records);
                if paused {
                    phases.transition(&[Phase::Running], Phase::Paused);
                    progress.emit(ProgressEvent::paused(done, "Processing paused."));
                } else {
                    phases.transition(&[Phase::Paused], Phase::Running);
                    progress.emit(ProgressEvent::running(done, "Processing resumed."));
                }
            }

            match result_receiver.recv_timeout(self.poll_interval) {
                Ok(TaskResult::Done(outcome)) => {
                    report.records_read += outcome.records_read;
                    report.outcomes.push(outcome);
                    if !stop_seen {
                        progress.emit(ProgressEvent::running(
                            percent(report.records_read, total_records),
                            format!(
                                "Processed chunk {} of {}",
                                report.outcomes.len(),
                                chunks.len()
                            ),
                        ));
                    }
                }
                Ok(TaskResult::Failed(failure)) => report.failures.push(failure),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        join_workers(handles);
        report.stopped = signals.stop_requested();
        Ok(report)
    }
}

fn join_workers(handles: Vec<thread::JoinHandle<()>>) {
    for (idx, handle) in handles.into_iter().enumerate() {
        if handle.join().is_err() {
            warn!("Worker thread {} panicked outside a chunk", idx);
        }
    }
}
