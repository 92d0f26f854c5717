use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Counters for one extraction run, filled in by the runner as phases finish
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub records_discovered: usize,
    pub records_read: usize,
    pub records_kept: usize,
    pub chunks_total: usize,
    pub chunks_completed: usize,
    /// Completed chunks that a stop cut short
    pub chunks_cut_short: usize,
    pub lines_spilled: usize,
    pub unique_positions: usize,
    pub elapsed: Duration,
    pub output_file: PathBuf,
}

impl RunSummary {
    pub fn new(output_file: PathBuf) -> Self {
        Self {
            output_file,
            ..Default::default()
        }
    }

    /// Message carried by the terminal `complete` event of a full run
    pub fn completion_message(&self) -> String {
        format!(
            "Success! Found {} unique positions from {} games. Results saved to '{}'. Total time: {}.",
            group_thousands(self.unique_positions),
            group_thousands(self.records_discovered),
            self.output_file.display(),
            format_elapsed(self.elapsed)
        )
    }

    /// Message for a stopped run whose finished chunks were kept
    pub fn partial_message(&self) -> String {
        format!(
            "Stopped by user. Saved {} unique positions from {} of {} chunk(s) to '{}'. Total time: {}.",
            group_thousands(self.unique_positions),
            self.chunks_completed,
            self.chunks_total,
            self.output_file.display(),
            format_elapsed(self.elapsed)
        )
    }

    pub fn format_stats(&self) -> String {
        let mut output = format!(
            "Games processed: {} total, {} read, {} kept",
            group_thousands(self.records_discovered),
            group_thousands(self.records_read),
            group_thousands(self.records_kept)
        );

        if self.chunks_total > 0 {
            output.push_str(&format!(
                "; Chunks: {} of {}",
                self.chunks_completed, self.chunks_total
            ));
            if self.chunks_cut_short > 0 {
                output.push_str(&format!(" ({} cut short)", self.chunks_cut_short));
            }
        }

        output.push_str(&format!(
            "; Unique positions: {} of {} spilled",
            group_thousands(self.unique_positions),
            group_thousands(self.lines_spilled)
        ));

        let elapsed_ms = self.elapsed.as_millis();
        output.push_str(&format!(" in {}ms", elapsed_ms));

        if elapsed_ms > 0 && self.records_read > 0 {
            let games_per_sec = (self.records_read as f64 * 1000.0) / elapsed_ms as f64;
            output.push_str(&format!(" ({:.0} games/s)", games_per_sec));
        }

        output
    }
}

/// `1234567` -> `1,234,567`
pub fn group_thousands(value: usize) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

/// `M minutes, S.SS seconds`
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs_f64();
    let minutes = (total / 60.0).floor();
    let seconds = total - minutes * 60.0;
    format!("{:.0} minutes, {:.2} seconds", minutes, seconds)
}
