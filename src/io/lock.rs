use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// How long a store write waits for another writer
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Exclusive advisory lock on a store data file, held for one write.
///
/// Several documents, possibly in different processes, may share a store.
/// The lock is an `flock` on a sibling `<file>.lock` that also records the
/// holder's pid. Released on drop.
#[derive(Debug)]
pub struct StoreLock {
    _file: File,
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("could not open lock file {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path} is locked by {}", holder_name(*.holder))]
    Busy { path: PathBuf, holder: Option<u32> },
}

fn holder_name(holder: Option<u32>) -> String {
    match holder {
        Some(pid) => format!("process {}", pid),
        None => "another writer".to_string(),
    }
}

impl StoreLock {
    /// Lock `data_file`, polling until `timeout` runs out
    pub fn acquire(data_file: &Path, timeout: Duration) -> Result<Self, LockError> {
        let path = lock_path_for(data_file);
        let open_error = |source| LockError::Open {
            path: path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(open_error)?;

        let start = Instant::now();
        let mut wait = Duration::from_millis(2);
        while try_lock(&file).is_err() {
            if start.elapsed() >= timeout {
                let holder = read_holder(&mut file);
                tracing::warn!(path = %path.display(), ?holder, "store lock busy");
                return Err(LockError::Busy { path, holder });
            }
            std::thread::sleep(wait);
            wait = (wait * 2).min(Duration::from_millis(50));
        }

        // The pid is informational; a lock without it is still a lock
        if let Err(e) = write_holder(&mut file) {
            tracing::debug!(error = %e, "could not record lock holder");
        }
        Ok(StoreLock { _file: file })
    }
}

fn lock_path_for(data_file: &Path) -> PathBuf {
    let mut name = data_file
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    data_file.with_file_name(name)
}

fn write_holder(file: &mut File) -> std::io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    write!(file, "{}", std::process::id())
}

fn read_holder(file: &mut File) -> Option<u32> {
    let mut text = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut text).ok()?;
    text.trim().parse().ok()
}

/// Take an exclusive flock without blocking
#[cfg(unix)]
fn try_lock(file: &File) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;
    let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if result == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn try_lock(_file: &File) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_file_sits_next_to_data() {
        let path = lock_path_for(Path::new("/tmp/store/tasks.json"));
        assert_eq!(path, PathBuf::from("/tmp/store/tasks.json.lock"));
    }

    #[test]
    fn test_relock_after_release() {
        let tmp = TempDir::new().unwrap();
        let data = tmp.path().join("tasks.json");
        drop(StoreLock::acquire(&data, DEFAULT_LOCK_TIMEOUT).unwrap());
        assert!(StoreLock::acquire(&data, DEFAULT_LOCK_TIMEOUT).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_second_writer_sees_holder() {
        let tmp = TempDir::new().unwrap();
        let data = tmp.path().join("tasks.json");

        let _first = StoreLock::acquire(&data, DEFAULT_LOCK_TIMEOUT).unwrap();
        let err = StoreLock::acquire(&data, Duration::from_millis(30)).unwrap_err();
        match err {
            LockError::Busy { holder, .. } => assert_eq!(holder, Some(std::process::id())),
            other => panic!("unexpected error: {}", other),
        }
    }
}
