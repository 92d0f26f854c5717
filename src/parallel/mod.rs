//! Parallel extraction module for epdsift
//!
//! Spreads the planned chunks across a fixed pool of OS threads. Each worker
//! owns its own file handle and writes one spill file per chunk.
//!
//! # Module Structure
//!
//! - `types`: Worker context, chunk outcomes and the pool report
//! - `worker`: Per-chunk extraction and the worker thread loop
//! - `pool`: `WorkerPool` orchestration and progress polling

mod pool;
mod types;
mod worker;

// Re-export public types
pub use pool::{WorkerPool, POLL_INTERVAL};
pub use types::{ChunkFailure, ChunkOutcome, PoolReport, WorkerContext};
pub use worker::{extract_chunk, spill_path_for, write_spill};
