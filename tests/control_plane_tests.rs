mod common;
use common::*;

use epdsift::{ExtractError, Extractor, Phase, ProgressEvent, RunOutcome, RunStatus, Settings};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(20);

fn settings(dir: &Path, input: &Path) -> Settings {
    let mut settings = Settings::new(input, dir.join("out.epd"));
    settings.worker_count = Some(2);
    settings
}

fn collect(events: &crossbeam_channel::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
    events.iter().collect()
}

/// Start a run over a large archive and hold it at the first worker checkpoint
fn start_paused(extractor: &Extractor, settings: Settings) -> crossbeam_channel::Receiver<ProgressEvent> {
    let events = extractor.start(settings).expect("start failed");
    extractor.pause();
    assert!(
        wait_until(WAIT, || extractor.status() == Phase::Paused),
        "run never reached the paused phase, status {}",
        extractor.status()
    );
    events
}

#[test]
fn test_full_run_reports_once_and_writes_sorted_output() {
    let dir = TempDir::new().unwrap();
    let input = write_file(dir.path(), "games.pgn", &synthetic_archive(40));
    let settings = settings(dir.path(), &input);
    let output = settings.output_file.clone();

    let extractor = Extractor::new();
    let events = extractor.start(settings).unwrap();
    let events = collect(&events);
    let outcome = extractor.wait().unwrap().unwrap();

    let RunOutcome::Complete(summary) = outcome else {
        panic!("expected a complete run");
    };
    assert_eq!(summary.records_discovered, 40);
    assert_eq!(summary.records_kept, 40);
    // Ten plies per game, every line tagged with its own players
    assert_eq!(summary.unique_positions, 400);
    assert_eq!(extractor.status(), Phase::Complete);

    let terminal: Vec<&ProgressEvent> = events.iter().filter(|e| e.terminal).collect();
    assert_eq!(terminal.len(), 1);
    let last = events.last().unwrap();
    assert!(last.terminal);
    assert_eq!(last.status, RunStatus::Complete);
    assert_eq!(last.progress, 100);
    assert!(last.message.starts_with("Success! Found 400 unique positions from 40 games."));
    assert!(events[0].message.starts_with("Starting EPD creation from"));

    let lines = read_lines(&output);
    assert_eq!(lines.len(), 400);
    assert_sorted_unique(&lines);
    assert!(lines.iter().all(|line| line.ends_with("\";")));
    assert!(no_spill_dirs(dir.path()));
}

#[test]
fn test_filters_apply_across_workers() {
    let dir = TempDir::new().unwrap();
    let mut pgn = String::new();
    pgn.push_str(&pgn_game("Strong", "Strong", "B90", (Some(2600), Some(2450)), OPENINGS[1].1));
    pgn.push_str(&pgn_game("Weak", "Strong", "B90", (Some(1800), Some(2600)), OPENINGS[1].1));
    pgn.push_str(&pgn_game("Unrated", "Strong", "B90", (None, Some(2600)), OPENINGS[1].1));
    pgn.push_str(&pgn_game("Strong", "Strong", "C60", (Some(2600), Some(2600)), OPENINGS[0].1));
    let input = write_file(dir.path(), "games.pgn", &pgn);

    let mut settings = settings(dir.path(), &input);
    settings.opening_prefix = Some("B".to_string());
    settings.min_ply = 3;
    settings.max_ply = 4;
    let output = settings.output_file.clone();

    let extractor = Extractor::new();
    let events = extractor.start(settings).unwrap();
    collect(&events);
    let outcome = extractor.wait().unwrap().unwrap();
    assert_eq!(outcome.summary().records_kept, 1);

    let lines = read_lines(&output);
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|l| l.contains("B90 2023-05-17 Strong vs Strong")));
    // 1. e4 c5 2. Nf3 (ply 3) then 2... d6 (ply 4)
    assert!(lines[0].starts_with("rnbqkbnr/pp1ppppp/8/2p5/4P3/5N2/PPPP1PPP/RNBQKB1R b KQkq - 1 2 "));
    assert!(lines[1].starts_with("rnbqkbnr/pp2pppp/3p4/2p5/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 0 3 "));
}

#[test]
fn test_single_ply_window() {
    let dir = TempDir::new().unwrap();
    let input = write_file(dir.path(), "games.pgn", &synthetic_archive(8));
    let mut settings = settings(dir.path(), &input);
    settings.min_ply = 0;
    settings.max_ply = 0;
    let output = settings.output_file.clone();

    let extractor = Extractor::new();
    collect(&extractor.start(settings).unwrap());
    extractor.wait().unwrap().unwrap();

    let lines = read_lines(&output);
    // One starting position per game, distinct only through the trace tag
    assert_eq!(lines.len(), 8);
    assert!(lines
        .iter()
        .all(|l| l.starts_with("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1 id ")));
}

#[test]
fn test_empty_archive_completes_with_empty_output() {
    let dir = TempDir::new().unwrap();
    let input = write_file(dir.path(), "games.pgn", "");
    let settings = settings(dir.path(), &input);
    let output = settings.output_file.clone();

    let extractor = Extractor::new();
    let events = collect(&extractor.start(settings).unwrap());
    let outcome = extractor.wait().unwrap().unwrap();

    assert!(matches!(outcome, RunOutcome::EmptyInput(_)));
    assert_eq!(extractor.status(), Phase::Complete);
    assert_eq!(fs::read_to_string(&output).unwrap(), "");
    assert_eq!(events.last().unwrap().message, "No games found in PGN file.");
}

#[test]
fn test_invalid_ply_range_has_no_side_effects() {
    let dir = TempDir::new().unwrap();
    let input = write_file(dir.path(), "games.pgn", &synthetic_archive(4));
    let mut settings = settings(dir.path(), &input);
    settings.min_ply = 12;
    settings.max_ply = 11;
    let output = settings.output_file.clone();

    let extractor = Extractor::new();
    let err = extractor.start(settings).unwrap_err();
    assert!(matches!(err, ExtractError::Config(_)));
    assert_eq!(extractor.status(), Phase::Idle);
    assert!(extractor.wait().is_none());
    assert!(!output.exists());
    assert!(no_spill_dirs(dir.path()));
}

#[test]
fn test_missing_input_fails_the_run() {
    let dir = TempDir::new().unwrap();
    let settings = settings(dir.path(), &dir.path().join("missing.pgn"));

    let extractor = Extractor::new();
    let events = collect(&extractor.start(settings).unwrap());
    let err = extractor.wait().unwrap().unwrap_err();

    assert!(matches!(err, ExtractError::InputNotFound { .. }));
    assert_eq!(extractor.status(), Phase::Failed);
    let last = events.last().unwrap();
    assert_eq!(last.status, RunStatus::Error);
    assert!(last.terminal);
    assert!(last.message.contains("missing.pgn"));
}

#[test]
fn test_pause_and_resume() {
    let dir = TempDir::new().unwrap();
    let input = write_file(dir.path(), "games.pgn", &synthetic_archive(2000));
    let settings = settings(dir.path(), &input);
    let paused_output = settings.output_file.clone();

    let extractor = Extractor::new();
    let events = start_paused(&extractor, settings.clone());

    // Nothing progresses while paused
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(extractor.status(), Phase::Paused);

    extractor.resume();
    let events = collect(&events);
    let outcome = extractor.wait().unwrap().unwrap();

    assert!(matches!(outcome, RunOutcome::Complete(_)));
    assert_eq!(outcome.summary().unique_positions, 20_000);
    assert!(events
        .iter()
        .any(|e| e.status == RunStatus::Paused && e.message == "Processing paused."));
    assert!(events.iter().any(|e| e.message == "Processing resumed."));
    assert_eq!(events.iter().filter(|e| e.terminal).count(), 1);

    // Pausing must not change a single byte of the result
    let mut plain = settings;
    plain.output_file = dir.path().join("plain.epd");
    collect(&extractor.start(plain.clone()).unwrap());
    assert!(matches!(extractor.wait().unwrap().unwrap(), RunOutcome::Complete(_)));
    assert_eq!(
        fs::read(&paused_output).unwrap(),
        fs::read(&plain.output_file).unwrap()
    );
}

#[test]
fn test_stop_with_save_after_some_chunks_finished() {
    let dir = TempDir::new().unwrap();
    // One worker over three capped chunks of 10 000 games each
    let input = write_file(dir.path(), "games.pgn", &synthetic_archive(30_000));
    let mut settings = settings(dir.path(), &input);
    settings.worker_count = Some(1);
    settings.min_ply = 1;
    settings.max_ply = 1;
    let output = settings.output_file.clone();

    let extractor = Extractor::new();
    let events = extractor.start(settings.clone()).unwrap();
    let mut seen = Vec::new();
    for event in events.iter() {
        let first_chunk_done = event.message == "Processed chunk 1 of 3";
        seen.push(event);
        if first_chunk_done {
            extractor.stop(true);
            break;
        }
    }
    seen.extend(events.iter());
    let outcome = extractor.wait().unwrap().unwrap();

    let RunOutcome::StoppedSaved(summary) = outcome else {
        panic!("expected a saved stop");
    };
    assert_eq!(summary.chunks_total, 3);
    assert!(summary.chunks_completed > 0);
    assert!(summary.chunks_completed < summary.chunks_total);
    assert!(summary.records_read < 30_000);
    // The chunk in flight flushed what it had; the last one never started
    assert_eq!(summary.chunks_cut_short, 1);
    assert_eq!(summary.lines_spilled, summary.unique_positions);
    assert_eq!(extractor.status(), Phase::Complete);
    assert_eq!(seen.iter().filter(|e| e.terminal).count(), 1);
    assert!(seen.last().unwrap().message.starts_with("Stopped by user."));
    assert!(no_spill_dirs(dir.path()));

    let saved = read_lines(&output);
    assert_sorted_unique(&saved);
    assert_eq!(saved.len(), summary.unique_positions);

    // Every game of the first chunk made it, nothing from the refused chunk did
    let has_game = |lines: &[String], i: usize| {
        let tag = format!("White {} vs Black {}\";", i, i);
        lines.iter().any(|l| l.ends_with(&tag))
    };
    assert!(has_game(&saved, 0));
    assert!(has_game(&saved, 9_999));
    assert!(!has_game(&saved, 20_000));
    assert!(!has_game(&saved, 29_999));

    // The saved lines are exactly what a full run produces for those games
    let mut full = settings;
    full.output_file = dir.path().join("full.epd");
    collect(&extractor.start(full.clone()).unwrap());
    extractor.wait().unwrap().unwrap();
    let complete: std::collections::BTreeSet<String> =
        read_lines(&full.output_file).into_iter().collect();
    assert_eq!(complete.len(), 30_000);
    assert!(saved.iter().all(|line| complete.contains(line)));
}

#[test]
fn test_stop_with_save_merges_finished_chunks() {
    let dir = TempDir::new().unwrap();
    let input = write_file(dir.path(), "games.pgn", &synthetic_archive(2000));
    let settings = settings(dir.path(), &input);
    let output = settings.output_file.clone();

    let extractor = Extractor::new();
    let events = start_paused(&extractor, settings);
    extractor.stop(true);
    assert!(matches!(
        extractor.status(),
        Phase::Stopping | Phase::Saving | Phase::Complete
    ));

    let events = collect(&events);
    let outcome = extractor.wait().unwrap().unwrap();

    let RunOutcome::StoppedSaved(summary) = outcome else {
        panic!("expected a saved stop");
    };
    // Workers were held before their first record
    assert_eq!(summary.unique_positions, 0);
    assert_eq!(extractor.status(), Phase::Complete);
    assert_eq!(fs::read_to_string(&output).unwrap(), "");

    let last = events.last().unwrap();
    assert_eq!(last.status, RunStatus::Complete);
    assert!(last.message.starts_with("Stopped by user."));
    assert_eq!(events.iter().filter(|e| e.terminal).count(), 1);
    assert!(no_spill_dirs(dir.path()));
}

#[test]
fn test_stop_without_save_leaves_output_untouched() {
    let dir = TempDir::new().unwrap();
    let input = write_file(dir.path(), "games.pgn", &synthetic_archive(2000));
    let settings = settings(dir.path(), &input);
    let output = settings.output_file.clone();
    fs::write(&output, "earlier result\n").unwrap();

    let extractor = Extractor::new();
    let events = start_paused(&extractor, settings);
    extractor.stop(false);

    let events = collect(&events);
    let outcome = extractor.wait().unwrap().unwrap();

    assert!(matches!(outcome, RunOutcome::StoppedDiscarded(_)));
    assert_eq!(extractor.status(), Phase::Stopped);
    assert_eq!(fs::read_to_string(&output).unwrap(), "earlier result\n");

    let last = events.last().unwrap();
    assert_eq!(last.status, RunStatus::Stopped);
    assert_eq!(last.message, "Processing stopped by user.");
    assert!(no_spill_dirs(dir.path()));
}

#[test]
fn test_second_start_is_rejected_while_active() {
    let dir = TempDir::new().unwrap();
    let input = write_file(dir.path(), "games.pgn", &synthetic_archive(2000));
    let settings = settings(dir.path(), &input);

    let extractor = Extractor::new();
    let events = start_paused(&extractor, settings.clone());

    let err = extractor.start(settings).unwrap_err();
    assert!(matches!(err, ExtractError::AlreadyRunning));
    assert_eq!(extractor.status(), Phase::Paused);

    extractor.stop(false);
    collect(&events);
    assert!(extractor.wait().unwrap().is_ok());
}

#[test]
fn test_restart_after_terminal_phase() {
    let dir = TempDir::new().unwrap();
    let input = write_file(dir.path(), "games.pgn", &synthetic_archive(2000));
    let settings = settings(dir.path(), &input);
    let output = settings.output_file.clone();

    let extractor = Extractor::new();
    let events = start_paused(&extractor, settings.clone());
    extractor.stop(false);
    collect(&events);
    extractor.wait().unwrap().unwrap();
    assert_eq!(extractor.status(), Phase::Stopped);

    // Fresh signals: the previous stop and pause do not carry over
    let events = collect(&extractor.start(settings).unwrap());
    let outcome = extractor.wait().unwrap().unwrap();
    assert!(matches!(outcome, RunOutcome::Complete(_)));
    assert_eq!(read_lines(&output).len(), 20_000);
    assert!(!events.iter().any(|e| e.status == RunStatus::Paused));
}

#[test]
fn test_worker_failure_fails_the_run() {
    let dir = TempDir::new().unwrap();
    let input = write_file(dir.path(), "games.pgn", &synthetic_archive(2000));
    let settings = settings(dir.path(), &input);
    let output = settings.output_file.clone();

    let extractor = Extractor::new();
    let events = start_paused(&extractor, settings);

    // Spill writes cannot succeed once their directory is gone
    let spills = spill_dirs(dir.path());
    assert_eq!(spills.len(), 1);
    fs::remove_dir_all(&spills[0]).unwrap();
    extractor.resume();

    let events = collect(&events);
    let err = extractor.wait().unwrap().unwrap_err();

    let ExtractError::WorkerFailed { failed, total, .. } = err else {
        panic!("expected a worker failure");
    };
    assert!(failed >= 1);
    assert_eq!(total, 2);
    assert_eq!(extractor.status(), Phase::Failed);
    assert!(!output.exists());
    assert_eq!(events.last().unwrap().status, RunStatus::Error);
    assert_eq!(events.iter().filter(|e| e.terminal).count(), 1);
}

#[test]
fn test_merge_failure_preserves_spills() {
    let dir = TempDir::new().unwrap();
    let input = write_file(dir.path(), "games.pgn", &synthetic_archive(12));
    let mut settings = settings(dir.path(), &input);
    // A directory in the output's place cannot be replaced by a file
    let blocked = dir.path().join("blocked.epd");
    fs::create_dir(&blocked).unwrap();
    settings.output_file = blocked.clone();

    let extractor = Extractor::new();
    let events = collect(&extractor.start(settings).unwrap());
    let err = extractor.wait().unwrap().unwrap_err();

    let ExtractError::MergeFailed { preserved, .. } = &err else {
        panic!("expected a merge failure, got {:?}", err);
    };
    let preserved = preserved.clone().expect("spill directory should be kept");
    assert!(preserved.is_dir());
    let kept = fs::read_dir(&preserved).unwrap().count();
    assert_eq!(kept, 2);
    assert!(blocked.is_dir());
    assert_eq!(extractor.status(), Phase::Failed);

    let last = events.last().unwrap();
    assert_eq!(last.status, RunStatus::Error);
    assert!(last.message.contains(&preserved.display().to_string()));
}

#[test]
fn test_small_progress_queue_keeps_terminal_event() {
    let dir = TempDir::new().unwrap();
    let input = write_file(dir.path(), "games.pgn", &synthetic_archive(200));
    let mut settings = settings(dir.path(), &input);
    settings.worker_count = Some(4);

    let extractor = Extractor::new().with_progress_capacity(2);
    let events = extractor.start(settings).unwrap();
    // Let the run finish before reading so older events are evicted
    let outcome = extractor.wait().unwrap().unwrap();
    assert!(matches!(outcome, RunOutcome::Complete(_)));

    let events = collect(&events);
    assert!(events.len() <= 2);
    let last = events.last().unwrap();
    assert!(last.terminal);
    assert_eq!(last.status, RunStatus::Complete);
}
