// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Writer singleton enforcement.
//!
//! Each flow has at most one active writer, enforced through an advisory
//! `flock` on the flow's `writer.lock` sentinel file. The lock is released
//! automatically when the holding process exits, so a crashed writer never
//! wedges a flow.

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::Path;

use crate::{Error, Result};

/// Exclusive advisory lock on a flow's writer sentinel.
///
/// Dropping the guard releases the lock.
pub(crate) struct WriterLock {
    file: File,
}

impl WriterLock {
    /// Acquires the exclusive writer lock, creating the sentinel file if it
    /// does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] if another writer already holds the lock.
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            let error = std::io::Error::last_os_error();
            return if error.raw_os_error() == Some(libc::EWOULDBLOCK) {
                Err(Error::Conflict)
            } else {
                Err(error.into())
            };
        }
        Ok(Self { file })
    }

    /// Probes whether the exclusive lock is currently held, without keeping
    /// any lock ourselves.
    ///
    /// A missing sentinel file means no writer ever attached.
    pub fn is_held(path: &Path) -> bool {
        let Ok(file) = File::open(path) else {
            return false;
        };
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_SH | libc::LOCK_NB) };
        if rc != 0 {
            return std::io::Error::last_os_error().raw_os_error() == Some(libc::EWOULDBLOCK);
        }
        unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
        false
    }
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        unsafe { libc::flock(self.file.as_raw_fd(), libc::LOCK_UN) };
    }
}
