//! Process Lock File Module
//!
//! Prevents multiple procwarden instances from running simultaneously,
//! which would cause database lock conflicts with sled and duplicate
//! restart attempts against the same processes.

use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Process lock file manager
///
/// Creates a lock file with the current process ID. A second instance
/// refuses to start while the file names a live procwarden process.
#[derive(Debug)]
pub struct ProcessLock {
    lock_path: PathBuf,
    owned: bool,
}

impl ProcessLock {
    /// Lock file name
    const LOCK_FILE_NAME: &'static str = ".procwarden.lock";

    /// Acquire a process lock for the given data directory
    ///
    /// Returns an error if another instance is already running.
    pub fn acquire<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();

        fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {data_dir:?}"))?;

        let lock_path = data_dir.join(Self::LOCK_FILE_NAME);

        if lock_path.exists() {
            match Self::check_existing_lock(&lock_path) {
                Ok(Some(pid)) => {
                    bail!(
                        "Another procwarden instance is already running (PID: {pid}).\n\
                         Stop it first, or remove a stale lock with: rm {lock_path:?}"
                    );
                }
                Ok(None) => {
                    tracing::info!("Removing stale lock file from previous instance");
                    fs::remove_file(&lock_path).context("Failed to remove stale lock file")?;
                }
                Err(e) => {
                    tracing::warn!("Error checking existing lock: {e}");
                    let _ = fs::remove_file(&lock_path);
                }
            }
        }

        let pid = std::process::id();
        let mut file = File::create(&lock_path)
            .with_context(|| format!("Failed to create lock file: {lock_path:?}"))?;
        writeln!(file, "{pid}").context("Failed to write PID to lock file")?;

        tracing::debug!("Acquired process lock (PID: {pid}) at {lock_path:?}");

        Ok(Self {
            lock_path,
            owned: true,
        })
    }

    /// Check whether an existing lock file is held by a running process.
    ///
    /// Returns `Ok(Some(pid))` for a live holder, `Ok(None)` for a stale
    /// file, `Err` if the file cannot be read or parsed.
    fn check_existing_lock(lock_path: &Path) -> Result<Option<u32>> {
        let contents =
            fs::read_to_string(lock_path).context("Failed to read existing lock file")?;
        let pid: u32 = contents
            .trim()
            .parse()
            .context("Failed to parse PID from lock file")?;

        if Self::is_procwarden_running(pid) {
            Ok(Some(pid))
        } else {
            Ok(None)
        }
    }

    /// Check whether `pid` is a live procwarden process.
    #[cfg(unix)]
    fn is_procwarden_running(pid: u32) -> bool {
        // A recycled PID belonging to some unrelated process must not
        // keep us from starting, so verify the command line too.
        let proc_path = format!("/proc/{pid}/cmdline");
        match fs::read_to_string(&proc_path) {
            Ok(cmdline) => cmdline.contains("procwarden"),
            Err(_) => false,
        }
    }

    #[cfg(not(unix))]
    fn is_procwarden_running(_pid: u32) -> bool {
        // Without /proc we cannot tell; assume it is running.
        true
    }

    /// Release the lock (called automatically on drop).
    pub fn release(&mut self) {
        if self.owned {
            if let Err(e) = fs::remove_file(&self.lock_path) {
                tracing::warn!("Failed to remove lock file: {e}");
            } else {
                tracing::debug!("Released process lock at {:?}", self.lock_path);
            }
            self.owned = false;
        }
    }

    /// Get the path to the lock file
    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_acquire_lock() {
        let temp_dir = tempdir().unwrap();
        let lock = ProcessLock::acquire(temp_dir.path()).unwrap();

        assert!(lock.path().exists());

        let contents = fs::read_to_string(lock.path()).unwrap();
        let pid: u32 = contents.trim().parse().unwrap();
        assert_eq!(pid, std::process::id());
    }

    #[test]
    fn test_lock_released_on_drop() {
        let temp_dir = tempdir().unwrap();
        let lock_path;

        {
            let lock = ProcessLock::acquire(temp_dir.path()).unwrap();
            lock_path = lock.path().to_path_buf();
            assert!(lock_path.exists());
        }

        assert!(!lock_path.exists());
    }

    #[test]
    fn test_stale_lock_removed() {
        let temp_dir = tempdir().unwrap();
        let lock_path = temp_dir.path().join(ProcessLock::LOCK_FILE_NAME);

        // A PID that cannot belong to a live procwarden process.
        fs::write(&lock_path, "999999999\n").unwrap();

        let lock = ProcessLock::acquire(temp_dir.path()).unwrap();
        assert!(lock.path().exists());
    }
}
