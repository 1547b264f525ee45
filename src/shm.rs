// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Memory-mapped shared region.
//!
//! A [`SharedRegion`] wraps one `mmap`-ed flow data file. The region is not
//! owned by any single process: creating it materializes the file, opening it
//! maps an existing file, and dropping a handle unmaps without unlinking.
//! Unlinking is the flow manager's job.

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// A shared, read-write memory mapping of a flow data file.
///
/// The mapping stays valid for the lifetime of the handle even if the backing
/// file is unlinked; invalidation is signalled through the flow header, not
/// through the mapping itself.
pub(crate) struct SharedRegion {
    ptr: *mut u8,
    len: usize,
}

// Safety: the region is plain shared memory; all concurrent access goes
// through atomics in the flow header or is gated by them.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    /// Creates a new data file of `len` zero-filled bytes and maps it
    /// read-write.
    ///
    /// Fails if the file already exists.
    pub fn create(path: &Path, len: usize) -> io::Result<Self> {
        let c_path = c_path(path)?;
        let fd = unsafe {
            libc::open(
                c_path.as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR | libc::O_CLOEXEC,
                0o644 as libc::c_uint,
            )
        };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        if unsafe { libc::ftruncate(fd, len as libc::off_t) } != 0 {
            let error = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(error);
        }
        Self::map(fd, len)
    }

    /// Maps an existing data file read-write.
    ///
    /// Readers also map read-write: they never touch payload bytes but do
    /// store to the control atomics in the header (`last_read_time`).
    pub fn open(path: &Path) -> io::Result<Self> {
        let c_path = c_path(path)?;
        let fd = unsafe { libc::open(c_path.as_ptr(), libc::O_RDWR | libc::O_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        if unsafe { libc::fstat(fd, &mut st) } != 0 {
            let error = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(error);
        }
        Self::map(fd, st.st_size as usize)
    }

    /// Maps `len` bytes of `fd` shared read-write, then closes the fd (the
    /// mapping keeps the file alive).
    fn map(fd: libc::c_int, len: usize) -> io::Result<Self> {
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        unsafe { libc::close(fd) };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            ptr: ptr as *mut u8,
            len,
        })
    }

    /// Base pointer of the mapping.
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr
    }

    /// Length of the mapping in bytes.
    pub fn len(&self) -> usize {
        self.len
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        unsafe { libc::munmap(self.ptr as *mut libc::c_void, self.len) };
    }
}

fn c_path(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_open_share_bytes() {
        let dir = std::env::temp_dir().join(format!("mxl_shm_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("region");

        let writer = SharedRegion::create(&path, 4096).unwrap();
        let reader = SharedRegion::open(&path).unwrap();
        assert_eq!(reader.len(), 4096);

        unsafe {
            *writer.as_ptr().add(17) = 0xAB;
        }
        assert_eq!(unsafe { *reader.as_ptr().add(17) }, 0xAB);

        drop(writer);
        drop(reader);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn create_refuses_existing_file() {
        let dir = std::env::temp_dir().join(format!("mxl_shm_excl_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("region");

        let _first = SharedRegion::create(&path, 1024).unwrap();
        assert!(SharedRegion::create(&path, 1024).is_err());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
