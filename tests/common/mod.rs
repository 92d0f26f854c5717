// tests/common/mod.rs
// Shared test utilities for integration tests
#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Mainlines used to build synthetic archives
pub const OPENINGS: &[(&str, &str)] = &[
    ("C60", "1. e4 e5 2. Nf3 Nc6 3. Bb5 a6 4. Ba4 Nf6 5. O-O Be7"),
    ("B90", "1. e4 c5 2. Nf3 d6 3. d4 cxd4 4. Nxd4 Nf6 5. Nc3 a6"),
    ("D37", "1. d4 d5 2. c4 e6 3. Nc3 Nf6 4. Nf3 Be7 5. Bf4 O-O"),
    ("A10", "1. c4 e5 2. Nc3 Nf6 3. g3 d5 4. cxd5 Nxd5 5. Bg2 Nb6"),
];

/// One PGN game with the usual seven tag roster plus ratings
pub fn pgn_game(
    white: &str,
    black: &str,
    eco: &str,
    ratings: (Option<u32>, Option<u32>),
    moves: &str,
) -> String {
    let mut game = String::new();
    game.push_str("[Event \"Synthetic\"]\n");
    game.push_str("[Site \"?\"]\n");
    game.push_str("[Date \"2023.05.17\"]\n");
    game.push_str(&format!("[White \"{}\"]\n", white));
    game.push_str(&format!("[Black \"{}\"]\n", black));
    game.push_str("[Result \"*\"]\n");
    game.push_str(&format!("[ECO \"{}\"]\n", eco));
    if let Some(elo) = ratings.0 {
        game.push_str(&format!("[WhiteElo \"{}\"]\n", elo));
    }
    if let Some(elo) = ratings.1 {
        game.push_str(&format!("[BlackElo \"{}\"]\n", elo));
    }
    game.push('\n');
    game.push_str(moves);
    game.push_str(" *\n\n");
    game
}

/// `count` strong games cycling through [`OPENINGS`], with distinct player names
pub fn synthetic_archive(count: usize) -> String {
    let mut pgn = String::new();
    for i in 0..count {
        let (eco, moves) = OPENINGS[i % OPENINGS.len()];
        pgn.push_str(&pgn_game(
            &format!("White {}", i),
            &format!("Black {}", i),
            eco,
            (Some(2500), Some(2500)),
            moves,
        ));
    }
    pgn
}

pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    let mut file = fs::File::create(&path).expect("Failed to create file");
    file.write_all(content.as_bytes())
        .expect("Failed to write file");
    path
}

pub fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .expect("Failed to read output")
        .lines()
        .map(str::to_string)
        .collect()
}

pub fn assert_sorted_unique(lines: &[String]) {
    for pair in lines.windows(2) {
        assert!(pair[0] < pair[1], "not strictly ascending: {:?}", pair);
    }
}

/// True if no spill directory was left behind in `dir`
pub fn no_spill_dirs(dir: &Path) -> bool {
    spill_dirs(dir).is_empty()
}

pub fn spill_dirs(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .expect("Failed to list directory")
        .map(|entry| entry.expect("Failed to read entry").path())
        .filter(|path| {
            path.file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with(".epdsift-spill-"))
        })
        .collect()
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

/// Run the built epdsift binary in `dir`, isolated from any user configuration
pub fn run_epdsift(dir: &Path, args: &[&str]) -> (String, String, i32) {
    run_epdsift_with_input(dir, args, "")
}

/// Run epdsift in `dir` with `input` piped to stdin
pub fn run_epdsift_with_input(dir: &Path, args: &[&str], input: &str) -> (String, String, i32) {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_epdsift"))
        .args(args)
        .current_dir(dir)
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir.join(".config"))
        .env("NO_EMOJI", "1")
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to start epdsift");

    if let Some(mut stdin) = cmd.stdin.take() {
        // The process may exit before reading everything
        let _ = stdin.write_all(input.as_bytes());
    }

    let output = cmd.wait_with_output().expect("Failed to read output");
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.code().unwrap_or(-1),
    )
}
