//! Run orchestration
//!
//! Drives one extraction run through scan, plan, the worker pool and the
//! merge, honoring stop requests, and emits exactly one terminal progress
//! event however the run ends.

use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;

use crate::config::Settings;
use crate::control::ControlSignals;
use crate::error::{ExtractError, Result};
use crate::merge::{self, merge_spills, output_dir};
use crate::parallel::{WorkerContext, WorkerPool};
use crate::planner::plan_chunks;
use crate::progress::{percent, ProgressEvent, ProgressSender, RunStatus};
use crate::scanner::scan_file;
use crate::session::{Phase, PhaseCell};
use crate::stats::{group_thousands, RunSummary};

const SPILL_DIR_PREFIX: &str = ".epdsift-spill-";

/// How a run that did not fail came to an end
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Every chunk ran and the output was written
    Complete(RunSummary),
    /// The input held no records; the output was written empty
    EmptyInput(RunSummary),
    /// Stopped with save; finished chunks were merged into the output
    StoppedSaved(RunSummary),
    /// Stopped without save; the output was left untouched
    StoppedDiscarded(RunSummary),
}

impl RunOutcome {
    pub fn summary(&self) -> &RunSummary {
        match self {
            RunOutcome::Complete(summary)
            | RunOutcome::EmptyInput(summary)
            | RunOutcome::StoppedSaved(summary)
            | RunOutcome::StoppedDiscarded(summary) => summary,
        }
    }

    pub fn status(&self) -> RunStatus {
        match self {
            RunOutcome::StoppedDiscarded(_) => RunStatus::Stopped,
            _ => RunStatus::Complete,
        }
    }

    pub fn is_user_stop(&self) -> bool {
        matches!(
            self,
            RunOutcome::StoppedSaved(_) | RunOutcome::StoppedDiscarded(_)
        )
    }

    fn final_phase(&self) -> Phase {
        match self {
            RunOutcome::StoppedDiscarded(_) => Phase::Stopped,
            _ => Phase::Complete,
        }
    }

    fn terminal_event(&self) -> ProgressEvent {
        match self {
            RunOutcome::Complete(summary) => ProgressEvent::complete(summary.completion_message()),
            RunOutcome::EmptyInput(_) => ProgressEvent::complete("No games found in PGN file."),
            RunOutcome::StoppedSaved(summary) => ProgressEvent::complete(summary.partial_message()),
            RunOutcome::StoppedDiscarded(summary) => ProgressEvent::stopped(
                percent(summary.records_read, summary.records_discovered),
                "Processing stopped by user.",
            ),
        }
    }
}

/// Run one extraction to its end.
///
/// Settles `phases` on a terminal phase and sends the single terminal event.
pub fn run_extraction(
    settings: &Settings,
    signals: &Arc<ControlSignals>,
    progress: &ProgressSender,
    phases: &PhaseCell,
) -> Result<RunOutcome> {
    let started = Instant::now();
    let result = settings
        .validate()
        .and_then(|()| execute(settings, signals, progress, phases, started));

    match &result {
        Ok(outcome) => {
            info!("Run finished: {}", outcome.summary().format_stats());
            phases.set(outcome.final_phase());
            progress.emit(outcome.terminal_event());
        }
        Err(e) => {
            warn!("Run failed: {}", e);
            phases.set(Phase::Failed);
            progress.emit(ProgressEvent::error(e.to_string()));
        }
    }
    result
}

fn execute(
    settings: &Settings,
    signals: &Arc<ControlSignals>,
    progress: &ProgressSender,
    phases: &PhaseCell,
    started: Instant,
) -> Result<RunOutcome> {
    let input = &settings.input_file;
    let output = &settings.output_file;
    let mut summary = RunSummary::new(output.clone());

    phases.advance(Phase::Scanning);
    progress.emit(ProgressEvent::running(
        0,
        format!("Starting EPD creation from '{}'...", input.display()),
    ));
    progress.emit(ProgressEvent::running(0, "Scanning PGN file to find game offsets..."));

    let offsets = scan_file(input)?;
    summary.records_discovered = offsets.len();

    if offsets.is_empty() {
        merge::write_sorted(&Default::default(), output)?;
        summary.elapsed = started.elapsed();
        return Ok(RunOutcome::EmptyInput(summary));
    }

    phases.advance(Phase::Planning);
    let workers = settings.effective_workers();
    let chunks = plan_chunks(&offsets, workers);
    drop(offsets);
    summary.chunks_total = chunks.len();
    info!(
        "Planned {} chunk(s) over {} worker(s)",
        chunks.len(),
        workers
    );
    progress.emit(ProgressEvent::running(
        0,
        format!(
            "Found {} games. Distributing work to workers...",
            group_thousands(summary.records_discovered)
        ),
    ));

    let spill_dir = tempfile::Builder::new()
        .prefix(SPILL_DIR_PREFIX)
        .tempdir_in(output_dir(output))?;

    if signals.stop_requested() {
        return finish_stopped(&[], spill_dir, summary, signals, progress, phases, started);
    }

    phases.advance(if signals.is_paused() {
        Phase::Paused
    } else {
        Phase::Running
    });

    let ctx = WorkerContext {
        input: input.clone(),
        spill_dir: spill_dir.path().to_path_buf(),
        criteria: settings.criteria(),
        signals: Arc::clone(signals),
    };
    let report = WorkerPool::new(workers).run(
        &chunks,
        ctx,
        summary.records_discovered,
        progress,
        phases,
    )?;

    summary.records_read = report.records_read;
    summary.records_kept = report.records_kept();
    summary.chunks_completed = report.outcomes.len();
    summary.chunks_cut_short = report.chunks_cut_short();
    summary.lines_spilled = report.lines_spilled();
    let spills = report.spill_paths();

    if report.stopped {
        // Failures after a stop are ignored; only finished tasks count
        return finish_stopped(&spills, spill_dir, summary, signals, progress, phases, started);
    }

    if let Some(first) = report.failures.first() {
        phases.set(Phase::Failing);
        discard(spill_dir);
        return Err(ExtractError::WorkerFailed {
            chunk_id: first.chunk_id,
            failed: report.failures.len(),
            total: report.chunks_total,
            message: first.message.clone(),
        });
    }

    phases.advance(Phase::Merging);
    progress.emit(ProgressEvent::running(
        100,
        "Processing complete. Merging temporary files...",
    ));
    summary.unique_positions = merge_into(&spills, output, spill_dir, progress)?;
    summary.elapsed = started.elapsed();
    Ok(RunOutcome::Complete(summary))
}

fn finish_stopped(
    spills: &[PathBuf],
    spill_dir: TempDir,
    mut summary: RunSummary,
    signals: &ControlSignals,
    progress: &ProgressSender,
    phases: &PhaseCell,
    started: Instant,
) -> Result<RunOutcome> {
    phases.set(Phase::Stopping);

    if signals.save_on_stop() {
        phases.set(Phase::Saving);
        info!("Saving {} finished chunk(s) after stop", spills.len());
        progress.emit(ProgressEvent::running(
            percent(summary.records_read, summary.records_discovered),
            "Stop requested. Saving results from finished chunks...",
        ));
        summary.unique_positions = merge_into(spills, &summary.output_file, spill_dir, progress)?;
        summary.elapsed = started.elapsed();
        Ok(RunOutcome::StoppedSaved(summary))
    } else {
        phases.set(Phase::Discarding);
        info!("Discarding {} spill file(s) after stop", spills.len());
        discard(spill_dir);
        summary.elapsed = started.elapsed();
        Ok(RunOutcome::StoppedDiscarded(summary))
    }
}

/// Merge spills into the output. On a write failure the spill directory is
/// kept on disk and named in the error.
fn merge_into(
    spills: &[PathBuf],
    output: &Path,
    spill_dir: TempDir,
    progress: &ProgressSender,
) -> Result<usize> {
    let merged = merge_spills(spills, output, |_| {
        progress.emit(ProgressEvent::running(
            100,
            "Merge complete. Sorting and writing final output file...",
        ));
    });

    match merged {
        Ok(unique) => {
            discard(spill_dir);
            Ok(unique)
        }
        Err(failure) => {
            let preserved = if failure.spills_intact {
                Some(spill_dir.keep())
            } else {
                discard(spill_dir);
                None
            };
            Err(ExtractError::MergeFailed {
                message: failure.message,
                preserved,
            })
        }
    }
}

fn discard(spill_dir: TempDir) {
    let path = spill_dir.path().to_path_buf();
    if let Err(e) = spill_dir.close() {
        warn!("Could not remove spill directory '{}': {}", path.display(), e);
    }
}
