//! Error taxonomy for an extraction run
//!
//! Record-level and field-level problems never reach this type; workers skip
//! the offending record instead. Everything here is terminal for a run.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    /// Settings rejected before any work starts
    #[error("invalid settings: {0}")]
    Config(String),

    #[error("input file not found at '{}': {source}", .path.display())]
    InputNotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A worker failed while no stop was requested
    #[error("{failed} of {total} chunk(s) failed, first failure in chunk {chunk_id}: {message}")]
    WorkerFailed {
        chunk_id: usize,
        failed: usize,
        total: usize,
        message: String,
    },

    /// Final output could not be produced; `preserved` names the surviving spill directory
    #[error("merge failed: {message}{}", preserved_suffix(.preserved))]
    MergeFailed {
        message: String,
        preserved: Option<PathBuf>,
    },

    #[error("a run is already active")]
    AlreadyRunning,

    #[error(transparent)]
    Io(#[from] io::Error),
}

fn preserved_suffix(preserved: &Option<PathBuf>) -> String {
    match preserved {
        Some(dir) => format!(" (spill files kept in '{}')", dir.display()),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, ExtractError>;
