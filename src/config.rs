use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ExtractError, Result};
use crate::record::GameRecord;

pub const DEFAULT_OUTPUT_FILE: &str = "output_positions.epd";
pub const DEFAULT_MIN_RATING: u32 = 2400;
pub const DEFAULT_MIN_PLY: u32 = 1;
pub const DEFAULT_MAX_PLY: u32 = 40;

/// Settings for one extraction run, as accepted by `start`
///
/// Field aliases accept the request body used by the socket front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(alias = "pgn_input_file")]
    pub input_file: PathBuf,
    pub output_file: PathBuf,
    #[serde(alias = "min_elo")]
    pub min_rating: u32,
    pub min_ply: u32,
    pub max_ply: u32,
    #[serde(alias = "eco_prefix")]
    pub opening_prefix: Option<String>,
    #[serde(alias = "workers")]
    pub worker_count: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input_file: PathBuf::new(),
            output_file: PathBuf::from(DEFAULT_OUTPUT_FILE),
            min_rating: DEFAULT_MIN_RATING,
            min_ply: DEFAULT_MIN_PLY,
            max_ply: DEFAULT_MAX_PLY,
            opening_prefix: None,
            worker_count: None,
        }
    }
}

impl Settings {
    pub fn new(input_file: impl Into<PathBuf>, output_file: impl Into<PathBuf>) -> Self {
        Self {
            input_file: input_file.into(),
            output_file: output_file.into(),
            ..Default::default()
        }
    }

    /// Reject settings that must never reach the scanner
    pub fn validate(&self) -> Result<()> {
        if self.input_file.as_os_str().is_empty() {
            return Err(ExtractError::Config("no input file given".to_string()));
        }
        if self.output_file.as_os_str().is_empty() {
            return Err(ExtractError::Config("no output file given".to_string()));
        }
        if self.min_ply > self.max_ply {
            return Err(ExtractError::Config(format!(
                "min_ply ({}) cannot be greater than max_ply ({})",
                self.min_ply, self.max_ply
            )));
        }
        if self.worker_count == Some(0) {
            return Err(ExtractError::Config(
                "worker count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Get effective worker count with defaults
    pub fn effective_workers(&self) -> usize {
        match self.worker_count {
            Some(n) if n > 0 => n,
            _ => num_cpus::get(),
        }
    }

    pub fn criteria(&self) -> FilterCriteria {
        FilterCriteria {
            min_rating: self.min_rating,
            opening_prefix: self
                .opening_prefix
                .clone()
                .filter(|prefix| !prefix.is_empty()),
            min_ply: self.min_ply,
            max_ply: self.max_ply,
        }
    }

    /// Human-readable description of the active filters
    pub fn describe(&self) -> Vec<String> {
        vec![
            format!("Ply Range: {} to {}", self.min_ply, self.max_ply),
            format!("Minimum ELO: {}", self.min_rating),
            format!(
                "ECO Prefix: '{}'",
                self.opening_prefix
                    .as_deref()
                    .filter(|p| !p.is_empty())
                    .unwrap_or("Any")
            ),
            format!("Using {} worker thread(s)", self.effective_workers()),
        ]
    }
}

/// Record-level filters and the ply window, shared read-only by all workers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterCriteria {
    /// Minimum rating for both sides; 0 disables the filter
    pub min_rating: u32,
    pub opening_prefix: Option<String>,
    /// Inclusive bounds over step indices; step 0 is the starting position
    pub min_ply: u32,
    pub max_ply: u32,
}

impl FilterCriteria {
    /// Whether a game passes the opening and rating filters.
    /// A missing or malformed rating rejects the game when the rating filter is on.
    pub fn admits(&self, game: &GameRecord) -> bool {
        if let Some(prefix) = &self.opening_prefix {
            if !game.header("ECO").unwrap_or("?").starts_with(prefix.as_str()) {
                return false;
            }
        }

        if self.min_rating > 0 {
            let rating = |key: &str| {
                game.header(key)
                    .unwrap_or("0")
                    .trim()
                    .parse::<u32>()
                    .ok()
            };
            return match (rating("WhiteElo"), rating("BlackElo")) {
                (Some(white), Some(black)) => {
                    white >= self.min_rating && black >= self.min_rating
                }
                _ => false,
            };
        }

        true
    }
}
