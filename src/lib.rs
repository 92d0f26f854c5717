// Core library for the epdsift position extractor

pub mod config;
pub mod control;
pub mod error;
pub mod merge;
pub mod parallel;
pub mod planner;
pub mod progress;
pub mod record;
pub mod runner;
pub mod scanner;
pub mod session;
pub mod stats;

pub use config::{FilterCriteria, Settings};
pub use control::ControlSignals;
pub use error::{ExtractError, Result};
pub use progress::{ProgressEvent, RunStatus};
pub use runner::{run_extraction, RunOutcome};
pub use session::{Extractor, Phase, PhaseCell};
pub use stats::RunSummary;
