//! Merge & dedup of spill files into the final output
//!
//! All spill lines go into one ordered set, which both removes exact
//! duplicates and gives the ascending output order. The output is replaced
//! atomically; spills are only deleted once the new file is in place.

use log::{debug, warn};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeFailure {
    pub message: String,
    /// True when the spill files were left untouched and can be merged again
    pub spills_intact: bool,
}

/// Directory the output file lives in, `.` for a bare file name
pub fn output_dir(output: &Path) -> PathBuf {
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn absorb(spill: &Path, unique: &mut BTreeSet<String>) -> io::Result<()> {
    let reader = BufReader::new(File::open(spill)?);
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if !line.is_empty() {
            unique.insert(line.to_string());
        }
    }
    Ok(())
}

/// Write `lines` in order through a temporary file renamed over `output`
pub fn write_sorted(lines: &BTreeSet<String>, output: &Path) -> io::Result<()> {
    let tmp = NamedTempFile::new_in(output_dir(output))?;
    let mut writer = BufWriter::new(tmp);
    for line in lines {
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    let tmp = writer.into_inner().map_err(|e| e.into_error())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))?;
    }

    tmp.persist(output).map_err(|e| e.error)?;
    Ok(())
}

fn remove_spills(spills: &[PathBuf]) {
    for spill in spills {
        match fs::remove_file(spill) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove spill file '{}': {}", spill.display(), e),
        }
    }
}

/// Merge every spill into `output` and return the number of unique lines.
///
/// `on_absorbed` runs once all spills are read, before anything is written.
pub fn merge_spills<F>(
    spills: &[PathBuf],
    output: &Path,
    on_absorbed: F,
) -> Result<usize, MergeFailure>
where
    F: FnOnce(usize),
{
    let mut unique = BTreeSet::new();
    for spill in spills {
        if let Err(e) = absorb(spill, &mut unique) {
            remove_spills(spills);
            return Err(MergeFailure {
                message: format!("failed to read spill file '{}': {}", spill.display(), e),
                spills_intact: false,
            });
        }
    }
    debug!("Absorbed {} spill file(s), {} unique line(s)", spills.len(), unique.len());
    on_absorbed(unique.len());

    if let Err(e) = write_sorted(&unique, output) {
        return Err(MergeFailure {
            message: format!("failed to write '{}': {}", output.display(), e),
            spills_intact: true,
        });
    }

    remove_spills(spills);
    Ok(unique.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn spill(dir: &TempDir, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.path().join(name);
        let mut text = lines.join("\n");
        text.push('\n');
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_merge_dedups_and_sorts() {
        let dir = TempDir::new().unwrap();
        let spills = vec![
            spill(&dir, "a.spill", &["c", "a", "b"]),
            spill(&dir, "b.spill", &["b", "d", "a"]),
        ];
        let output = dir.path().join("out.epd");

        let mut absorbed = None;
        let count = merge_spills(&spills, &output, |n| absorbed = Some(n)).unwrap();
        assert_eq!(count, 4);
        assert_eq!(absorbed, Some(4));
        assert_eq!(fs::read_to_string(&output).unwrap(), "a\nb\nc\nd\n");
        assert!(spills.iter().all(|s| !s.exists()));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let spills = vec![spill(&dir, "a.spill", &["z", "y", "z"])];
        let output = dir.path().join("out.epd");
        merge_spills(&spills, &output, |_| {}).unwrap();
        let first = fs::read_to_string(&output).unwrap();

        // Feeding the output back in as the only spill yields the same file
        let again = dir.path().join("again.spill");
        fs::copy(&output, &again).unwrap();
        merge_spills(&[again], &output, |_| {}).unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), first);
    }

    #[test]
    fn test_merge_replaces_existing_output() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.epd");
        fs::write(&output, "stale\n").unwrap();
        let spills = vec![spill(&dir, "a.spill", &["fresh"])];
        merge_spills(&spills, &output, |_| {}).unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), "fresh\n");
    }

    #[test]
    fn test_read_failure_removes_spills() {
        let dir = TempDir::new().unwrap();
        let good = spill(&dir, "a.spill", &["a"]);
        let missing = dir.path().join("missing.spill");
        let output = dir.path().join("out.epd");

        let failure = merge_spills(&[good.clone(), missing], &output, |_| {}).unwrap_err();
        assert!(!failure.spills_intact);
        assert!(!good.exists());
        assert!(!output.exists());
    }

    #[test]
    fn test_write_failure_keeps_spills() {
        let dir = TempDir::new().unwrap();
        let good = spill(&dir, "a.spill", &["a"]);
        let output = dir.path().join("no-such-dir").join("out.epd");

        let failure = merge_spills(&[good.clone()], &output, |_| {}).unwrap_err();
        assert!(failure.spills_intact);
        assert!(good.exists());
    }

    #[test]
    fn test_output_dir() {
        assert_eq!(output_dir(Path::new("out.epd")), PathBuf::from("."));
        assert_eq!(output_dir(Path::new("/tmp/x/out.epd")), PathBuf::from("/tmp/x"));
    }
}
