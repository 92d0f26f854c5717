// CLI-specific types and structures
// This module contains the command-line interface definitions

use clap::Parser;
use epdsift::config::{DEFAULT_MAX_PLY, DEFAULT_MIN_PLY, DEFAULT_MIN_RATING, DEFAULT_OUTPUT_FILE};
use epdsift::Settings;
use std::path::PathBuf;

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProgressFormat {
    /// `[STATUS] NN% - message` lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
    /// No progress output
    None,
}

#[derive(Parser, Debug)]
#[command(name = "epdsift")]
#[command(about = "Extract unique, sorted EPD positions from a PGN archive")]
#[command(
    long_about = "Extract unique, sorted EPD positions from a PGN archive\n\nEvery game passing the rating and opening filters contributes the board\nstate after each ply in the selected range. Work is spread across worker\nthreads and the results are merged into one deduplicated file.\n\nCOMMON EXAMPLES:\n  epdsift games.pgn\n  epdsift games.pgn -o sicilian.epd -c B2 -s 4 -m 24\n  epdsift games.pgn -e 0 -w 8 --progress json\n\nCONTROL:\n  Ctrl-C stops cooperatively (twice to exit at once). With --control-stdin,\n  the commands pause, resume, stop, 'stop save' and status are read from stdin."
)]
#[command(version)]
#[command(args_override_self = true)]
pub struct Cli {
    /// Input PGN file
    pub input: Option<PathBuf>,

    /// Output EPD file
    #[arg(short = 'o', long = "output", default_value = DEFAULT_OUTPUT_FILE, help_heading = "Extraction Options")]
    pub output: PathBuf,

    /// First ply to record; 0 is the starting position
    #[arg(short = 's', long = "min-ply", default_value_t = DEFAULT_MIN_PLY, help_heading = "Extraction Options")]
    pub min_ply: u32,

    /// Last ply to record
    #[arg(short = 'm', long = "max-ply", default_value_t = DEFAULT_MAX_PLY, help_heading = "Extraction Options")]
    pub max_ply: u32,

    /// Minimum rating for both players (0 disables the filter)
    #[arg(short = 'e', long = "elo", default_value_t = DEFAULT_MIN_RATING, help_heading = "Extraction Options")]
    pub min_elo: u32,

    /// ECO code prefix to keep, e.g. B2 or C
    #[arg(short = 'c', long = "eco", help_heading = "Extraction Options")]
    pub eco: Option<String>,

    /// Number of worker threads (default: number of CPUs)
    #[arg(short = 'w', long = "workers", help_heading = "Extraction Options")]
    pub workers: Option<usize>,

    /// Progress output format (text on stderr, json on stdout)
    #[arg(long = "progress", value_enum, default_value = "text", help_heading = "Output Options")]
    pub progress: ProgressFormat,

    /// Print run statistics when finished
    #[arg(long = "stats", help_heading = "Output Options")]
    pub stats: bool,

    /// Suppress the banner and progress output
    #[arg(short = 'q', long = "quiet", help_heading = "Output Options")]
    pub quiet: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Output Options")]
    pub verbose: u8,

    /// Disable emoji prefixes in diagnostics
    #[arg(long = "no-emoji", help_heading = "Output Options")]
    pub no_emoji: bool,

    /// Read control commands (pause, resume, stop, stop save, status) from stdin
    #[arg(long = "control-stdin", help_heading = "Control Options")]
    pub control_stdin: bool,

    /// Merge finished chunks into the output when interrupted
    #[arg(long = "save-on-interrupt", help_heading = "Control Options")]
    pub save_on_interrupt: bool,

    /// Specify custom configuration file path
    #[arg(long = "config-file", help_heading = "Configuration Options")]
    pub config_file: Option<String>,

    /// Ignore configuration files
    #[arg(long = "ignore-config", help_heading = "Configuration Options")]
    pub ignore_config: bool,

    /// Use alias from configuration file
    #[arg(short = 'a', long = "alias", help_heading = "Configuration Options")]
    pub alias: Vec<String>,

    /// Show configuration files and exit
    #[arg(long = "show-config", help_heading = "Configuration Options")]
    pub show_config: bool,
}

impl Cli {
    pub fn to_settings(&self) -> Option<Settings> {
        let input = self.input.clone()?;
        Some(Settings {
            input_file: input,
            output_file: self.output.clone(),
            min_rating: self.min_elo,
            min_ply: self.min_ply,
            max_ply: self.max_ply,
            opening_prefix: self.eco.clone().filter(|eco| !eco.is_empty()),
            worker_count: self.workers,
        })
    }

    /// Log level implied by -q/-v, before RUST_LOG is applied
    pub fn log_level(&self) -> log::LevelFilter {
        if self.quiet {
            return log::LevelFilter::Error;
        }
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}
