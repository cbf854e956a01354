//! Atomic file replacement, and a rescue log for text that could not be
//! written.
//!
//! The rescue log lives next to the file that failed, one JSON object per
//! line, so a user can recover unsaved document text or store data by hand.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

const LOG_FILE: &str = ".wikisync-rescue.jsonl";

/// Which kind of file the rescued text belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RescueKind {
    Document,
    Store,
}

/// Text that could not be written to `target`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rescued {
    pub at: DateTime<Utc>,
    pub kind: RescueKind,
    pub target: PathBuf,
    pub error: String,
    pub text: String,
}

/// Rescue log for files in the same directory as `target`
pub fn rescue_log_path(target: &Path) -> PathBuf {
    target.parent().unwrap_or(Path::new(".")).join(LOG_FILE)
}

/// Write `content` to `path` atomically using a temp file + rename.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Atomically replace `path` with `content`. On failure the content goes to
/// the rescue log before the write error is returned.
pub fn write_or_rescue(path: &Path, content: &str, kind: RescueKind) -> io::Result<()> {
    let Err(err) = atomic_write(path, content.as_bytes()) else {
        return Ok(());
    };
    rescue(Rescued {
        at: Utc::now(),
        kind,
        target: path.to_path_buf(),
        error: err.to_string(),
        text: content.to_string(),
    });
    Err(err)
}

/// Append to the rescue log. Runs on an error path already, so its own
/// failures are logged and dropped.
pub fn rescue(entry: Rescued) {
    let log = rescue_log_path(&entry.target);
    let appended = serde_json::to_string(&entry)
        .map_err(io::Error::other)
        .and_then(|line| {
            let mut file = OpenOptions::new().create(true).append(true).open(&log)?;
            writeln!(file, "{}", line)
        });
    match appended {
        Ok(()) => tracing::warn!(
            target_file = %entry.target.display(),
            log = %log.display(),
            "unsaved text written to rescue log"
        ),
        Err(e) => tracing::error!(error = %e, "could not write to rescue log"),
    }
}

/// Everything rescued for files next to `target`, oldest first. Lines that
/// do not parse are skipped.
pub fn read_rescued(target: &Path) -> Vec<Rescued> {
    let Ok(content) = fs::read_to_string(rescue_log_path(target)) else {
        return Vec::new();
    };
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str(line) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::debug!(error = %e, "skipping unreadable rescue entry");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_replaces_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out.txt");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
    }

    #[test]
    fn test_failed_write_is_rescued() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("tasks.json");
        fs::create_dir(&target).unwrap();

        assert!(write_or_rescue(&target, "{\"records\": []}", RescueKind::Store).is_err());
        assert!(write_or_rescue(&target, "line one\nline two\n", RescueKind::Store).is_err());

        let rescued = read_rescued(&target);
        assert_eq!(rescued.len(), 2);
        assert_eq!(rescued[0].kind, RescueKind::Store);
        assert_eq!(rescued[0].target, target);
        assert_eq!(rescued[1].text, "line one\nline two\n");
    }

    #[test]
    fn test_unreadable_lines_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("todo.wiki");
        fs::write(rescue_log_path(&target), "not json\n\n").unwrap();
        assert!(read_rescued(&target).is_empty());
    }

    #[test]
    fn test_missing_log_reads_empty() {
        let tmp = TempDir::new().unwrap();
        assert!(read_rescued(&tmp.path().join("todo.wiki")).is_empty());
    }
}
