//! Cross-process advisory locking for files shared between `wd` processes.
//!
//! The in-process `RwLock` on [`crate::store::Store`] only serializes callers
//! that share one store instance. Two processes pointed at the same directory
//! additionally coordinate through an `fs2` exclusive lock on a sidecar file.

use fs2::FileExt;
use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use crate::error::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// RAII guard for an exclusive advisory lock on a sidecar lock file.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Acquire the lock, polling until `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] with [`io::ErrorKind::WouldBlock`] when the
    /// lock is still held after `timeout`, or the underlying I/O error when
    /// the lock file cannot be opened.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| Error::storage(parent, err))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|err| Error::storage(path, err))?;

        let start = Instant::now();
        loop {
            if FileExt::try_lock_exclusive(&file).is_ok() {
                return Ok(Self {
                    file,
                    path: path.to_path_buf(),
                });
            }

            if start.elapsed() >= timeout {
                return Err(Error::storage(
                    path,
                    io::Error::new(
                        io::ErrorKind::WouldBlock,
                        format!("lock timed out after {:?}", start.elapsed()),
                    ),
                ));
            }

            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Return the lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::FileLock;
    use crate::error::{Error, ErrorCode};
    use std::{
        sync::{Arc, Barrier},
        thread,
        time::Duration,
    };

    #[test]
    fn lock_allows_acquire_and_release() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("items.lock");
        let lock = FileLock::acquire(&path, Duration::from_millis(50)).expect("lock");
        assert_eq!(lock.path(), path.as_path());
    }

    #[test]
    fn lock_times_out_when_held() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("items.lock");
        let _guard = FileLock::acquire(&path, Duration::from_millis(50)).expect("lock");
        let err = FileLock::acquire(&path, Duration::from_millis(20)).unwrap_err();

        assert!(matches!(err, Error::Storage { .. }));
        assert_eq!(err.code(), ErrorCode::LockContention);
    }

    #[test]
    fn release_allows_follow_up_lock() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("items.lock");
        {
            let _first = FileLock::acquire(&path, Duration::from_millis(50)).expect("lock");
        }
        let _second = FileLock::acquire(&path, Duration::from_millis(50)).expect("relock");
    }

    #[test]
    fn contention_is_resolved_after_holder_releases() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("items.lock");

        let held = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));

        let held_thread = Arc::clone(&held);
        let release_thread = Arc::clone(&release);
        let path_in_thread = path.clone();
        let handle = thread::spawn(move || {
            let _holder = FileLock::acquire(&path_in_thread, Duration::from_millis(200)).unwrap();
            held_thread.wait();
            release_thread.wait();
        });

        held.wait();
        assert!(FileLock::acquire(&path, Duration::from_millis(20)).is_err());
        release.wait();
        handle.join().unwrap();

        assert!(FileLock::acquire(&path, Duration::from_millis(50)).is_ok());
    }
}
