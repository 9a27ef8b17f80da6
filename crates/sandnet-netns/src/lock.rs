//! Host-wide lock serializing the provider's first namespace cycle.
//!
//! Some plugin chains perform non-idempotent first-use setup (shared
//! bridges, IPAM state). Two providers in independent processes racing on
//! that first use can corrupt it, so the self-test runs under an advisory
//! `flock(2)` on a well-known file.
//!
//! Synchronization protocol:
//! - Protected section: one self-test cycle (create + destroy).
//! - Acquisition blocks without a timeout.
//! - Release: dropping [`InitLock`] closes the descriptor, which drops the
//!   `flock`. The kernel does the same if the process dies.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};

use crate::error::{NetworkError, Result};

/// Scoped exclusive hold on the init lock file.
#[derive(Debug)]
pub struct InitLock {
    path: PathBuf,
    _lock: Flock<File>,
}

impl InitLock {
    /// Blocks until the lock at `path` is held exclusively.
    ///
    /// The file (and its parent directory) is created when missing.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::Lock`] if the file cannot be opened or locked.
    pub fn acquire(path: &Path) -> Result<Self> {
        let lock_error = |source: std::io::Error| NetworkError::Lock {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(lock_error)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(lock_error)?;

        tracing::debug!(path = %path.display(), "acquiring cni init lock");
        let lock = loop {
            match Flock::lock(file, FlockArg::LockExclusive) {
                Ok(lock) => break lock,
                Err((retry, Errno::EINTR)) => file = retry,
                Err((_, errno)) => return Err(lock_error(errno.into())),
            }
        };
        tracing::debug!(path = %path.display(), "cni init lock acquired");

        Ok(Self {
            path: path.to_path_buf(),
            _lock: lock,
        })
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InitLock {
    fn drop(&mut self) {
        tracing::debug!(path = %self.path.display(), "cni init lock released");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn creates_missing_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locks").join("cni-init.lock");
        let lock = InitLock::acquire(&path).unwrap();
        assert!(path.exists());
        assert_eq!(lock.path(), path);
    }

    #[test]
    fn second_holder_waits_for_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cni-init.lock");
        let first = InitLock::acquire(&path).unwrap();

        let (tx, rx) = mpsc::channel();
        let waiter = {
            let path = path.clone();
            std::thread::spawn(move || {
                let _second = InitLock::acquire(&path).unwrap();
                tx.send(()).unwrap();
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        drop(first);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        waiter.join().unwrap();
    }
}
