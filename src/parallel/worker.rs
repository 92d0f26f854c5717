//! Worker thread for parallel extraction
//!
//! Each worker pulls chunks off the shared queue, decodes its records from
//! its own file handle and writes exactly one spill file per chunk.

use crossbeam_channel::{Receiver, Sender};
use log::{debug, warn};
use std::any::Any;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use crate::control::Checkpoint;
use crate::error::Result;
use crate::planner::Chunk;
use crate::record::RecordReader;

use super::types::{ChunkFailure, ChunkOutcome, TaskResult, WorkerContext};

pub fn spill_path_for(spill_dir: &Path, chunk_id: usize) -> PathBuf {
    spill_dir.join(format!("chunk-{:05}.spill", chunk_id))
}

/// Decode one chunk and flush its positions to a spill file.
///
/// A stop abandons the remaining records but the spill file is still written
/// with whatever was collected so far.
pub fn extract_chunk(chunk: &Chunk, ctx: &WorkerContext) -> Result<ChunkOutcome> {
    let mut file = File::open(&ctx.input)?;
    file.seek(SeekFrom::Start(chunk.start_offset))?;
    let mut reader = RecordReader::new(BufReader::with_capacity(1 << 16, file));

    let criteria = &ctx.criteria;
    let signals = &ctx.signals;
    let mut positions: HashSet<String> = HashSet::new();
    let mut records_read = 0usize;
    let mut records_kept = 0usize;
    let mut stopped_early = false;

    'records: for _ in 0..chunk.record_count {
        if signals.checkpoint() == Checkpoint::Stop {
            stopped_early = true;
            break;
        }

        let Some(game) = reader.read_record()? else {
            debug!("Chunk {} ended after {} record(s)", chunk.id, records_read);
            break;
        };
        records_read += 1;

        if !criteria.admits(&game) {
            continue;
        }
        let Some(mut replay) = game.replay() else {
            debug!("Skipping game with unusable set-up position in chunk {}", chunk.id);
            continue;
        };

        let tag = game.trace_tag();
        let mut step = 0u32;
        loop {
            if step >= criteria.min_ply {
                positions.insert(format!("{} {}", replay.fen(), tag));
            }
            if step >= criteria.max_ply {
                break;
            }
            if signals.checkpoint() == Checkpoint::Stop {
                stopped_early = true;
                records_kept += 1;
                break 'records;
            }
            if !replay.advance() {
                break;
            }
            step += 1;
        }
        records_kept += 1;
    }

    let spill_path = spill_path_for(&ctx.spill_dir, chunk.id);
    let lines_written = write_spill(&spill_path, &positions)?;

    Ok(ChunkOutcome {
        chunk_id: chunk.id,
        spill_path,
        records_read,
        records_kept,
        lines_written,
        stopped_early,
    })
}

/// Write the local result set, one line per position. A failed write removes
/// the partial file.
pub fn write_spill(path: &Path, positions: &HashSet<String>) -> io::Result<usize> {
    let write = || -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        for line in positions {
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()
    };

    if let Err(e) = write() {
        let _ = fs::remove_file(path);
        return Err(e);
    }
    Ok(positions.len())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

/// Worker thread: processes chunks until the queue is drained
pub(crate) fn worker_thread(
    worker_id: usize,
    task_receiver: Receiver<Chunk>,
    result_sender: Sender<TaskResult>,
    ctx: &WorkerContext,
) {
    while let Ok(chunk) = task_receiver.recv() {
        // Queued chunks are refused once a stop or an abort is in effect
        if ctx.signals.is_halted() {
            debug!("Worker {} refusing chunk {} after stop", worker_id, chunk.id);
            continue;
        }

        let result = match panic::catch_unwind(AssertUnwindSafe(|| extract_chunk(&chunk, ctx))) {
            Ok(Ok(outcome)) => TaskResult::Done(outcome),
            Ok(Err(e)) => TaskResult::Failed(ChunkFailure {
                chunk_id: chunk.id,
                message: e.to_string(),
            }),
            Err(payload) => TaskResult::Failed(ChunkFailure {
                chunk_id: chunk.id,
                message: panic_message(payload.as_ref()),
            }),
        };

        if let TaskResult::Failed(failure) = &result {
            warn!(
                "Worker {} failed on chunk {}: {}",
                worker_id, failure.chunk_id, failure.message
            );
            // Without a stop the run is lost; spare the other workers the effort
            if !ctx.signals.stop_requested() {
                ctx.signals.abort();
            }
        }

        if result_sender.send(result).is_err() {
            break;
        }
    }
}
