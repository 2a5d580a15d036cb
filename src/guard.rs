//! Single-instance guard.
//!
//! Exclusion uses an advisory `flock(LOCK_EX | LOCK_NB)` (via `fs2`) on a
//! well-known path. The lock belongs to the open file description, so the OS
//! drops it when the process exits for any reason. The lock file itself is
//! never removed: deleting it would let a second process lock a fresh inode
//! while the first still holds the old one.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::error::GuardError;

/// Result of trying to become the active logger.
#[derive(Debug)]
pub enum Acquisition {
    /// This process now holds the lock.
    Acquired(InstanceGuard),
    /// Another live process holds it.
    AlreadyRunning,
}

/// Exclusive ownership of logging duty for one lock path.
///
/// Dropping the guard releases the lock.
#[derive(Debug)]
pub struct InstanceGuard {
    file: File,
    path: PathBuf,
}

impl InstanceGuard {
    /// Try to take the lock without blocking.
    pub fn acquire<P: AsRef<Path>>(lock_path: P) -> Result<Acquisition, GuardError> {
        let path = lock_path.as_ref().to_path_buf();
        let io_err = |source: io::Error| GuardError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false) // Contents are informational; the lock is what matters
            .open(&path)
            .map_err(io_err)?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.kind() == io::ErrorKind::WouldBlock
                || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
            {
                debug!("{} is held by another process", path.display());
                return Ok(Acquisition::AlreadyRunning);
            }
            return Err(io_err(e));
        }

        // Record the holder's PID for whoever inspects the lock file
        file.set_len(0).map_err(io_err)?;
        let mut writer = &file;
        writer
            .write_all(format!("{}\n", std::process::id()).as_bytes())
            .map_err(io_err)?;

        debug!("Acquired instance lock {}", path.display());
        Ok(Acquisition::Acquired(InstanceGuard { file, path }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        // Best effort; closing the descriptor releases it anyway
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_reports_already_running() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join("logger.lock");

        let first = InstanceGuard::acquire(&lock).unwrap();
        assert!(matches!(first, Acquisition::Acquired(_)));

        let second = InstanceGuard::acquire(&lock).unwrap();
        assert!(matches!(second, Acquisition::AlreadyRunning));

        drop(first);
        let third = InstanceGuard::acquire(&lock).unwrap();
        assert!(matches!(third, Acquisition::Acquired(_)));
    }

    #[test]
    fn test_concurrent_acquire_has_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join("logger.lock");
        let barrier = std::sync::Arc::new(std::sync::Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let lock = lock.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    InstanceGuard::acquire(&lock).unwrap()
                })
            })
            .collect();
        let results: Vec<Acquisition> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let acquired = results
            .iter()
            .filter(|r| matches!(r, Acquisition::Acquired(_)))
            .count();
        let running = results
            .iter()
            .filter(|r| matches!(r, Acquisition::AlreadyRunning))
            .count();
        assert_eq!((acquired, running), (1, 1));
    }

    #[test]
    fn test_lock_file_records_pid_and_parents() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join("run/dht/logger.lock");

        let Acquisition::Acquired(guard) = InstanceGuard::acquire(&lock).unwrap() else {
            panic!("expected to acquire a fresh lock");
        };
        assert_eq!(guard.path(), lock.as_path());
        assert_eq!(
            fs::read_to_string(&lock).unwrap().trim(),
            std::process::id().to_string()
        );
    }
}
