//! Advisory file locking for the correction log.
//!
//! Two processes appending to the same log would interleave entries and break
//! last-write-wins replay, so the log owner holds an exclusive lock on a
//! sidecar `.lock` file for its whole lifetime.

use std::fs::{File, OpenOptions};
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::path::{Path, PathBuf};

/// Exclusive lock held on a lock file.
///
/// Released when dropped (the OS drops the lock with the descriptor).
#[derive(Debug)]
pub struct FileLock {
    _file: File,
    path: PathBuf,
}

impl FileLock {
    /// Attempts to acquire an exclusive lock on `lock_path`, creating the file
    /// if needed.
    ///
    /// # Errors
    /// - `ErrorKind::WouldBlock` if another process holds the lock
    /// - Any I/O error from creating the lock file
    pub fn acquire(lock_path: &Path) -> IoResult<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)?;

        Self::try_lock(&file)?;

        Ok(Self {
            _file: file,
            path: lock_path.to_path_buf(),
        })
    }

    /// Returns the path to the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(unix)]
    fn try_lock(file: &File) -> IoResult<()> {
        use std::os::unix::io::AsRawFd;

        let fd = file.as_raw_fd();
        // SAFETY: `fd` is a valid open descriptor owned by `file` for the call.
        let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };

        if result != 0 {
            let errno = IoError::last_os_error();
            if errno.raw_os_error() == Some(libc::EWOULDBLOCK) {
                return Err(IoError::new(
                    ErrorKind::WouldBlock,
                    "correction log is locked by another process",
                ));
            }
            return Err(errno);
        }

        Ok(())
    }

    #[cfg(windows)]
    fn try_lock(file: &File) -> IoResult<()> {
        use std::os::windows::io::AsRawHandle;
        use windows_sys::Win32::Foundation::HANDLE;
        use windows_sys::Win32::Storage::FileSystem::{
            LockFileEx, LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY,
        };

        let handle = file.as_raw_handle() as HANDLE;
        // SAFETY: `handle` is valid for the call and `overlapped` is zeroed as
        // LockFileEx requires for synchronous handles.
        let result = unsafe {
            let mut overlapped = std::mem::zeroed::<windows_sys::Win32::System::IO::OVERLAPPED>();
            LockFileEx(
                handle,
                LOCKFILE_EXCLUSIVE_LOCK | LOCKFILE_FAIL_IMMEDIATELY,
                0,
                1,
                0,
                &mut overlapped,
            )
        };

        if result == 0 {
            let err = IoError::last_os_error();
            return Err(IoError::new(
                ErrorKind::WouldBlock,
                format!("correction log is locked by another process: {err}"),
            ));
        }

        Ok(())
    }

    /// Without an OS lock a second process could append to the same log, so
    /// opening a durable log is refused outright.
    #[cfg(not(any(unix, windows)))]
    fn try_lock(_file: &File) -> IoResult<()> {
        Err(IoError::new(
            ErrorKind::Unsupported,
            "file locking not supported on this platform; use an in-memory correction store",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_lock_acquire_release() {
        let dir = tempdir().unwrap();
        let lock_path = dir.path().join("corrections.log.lock");

        {
            let lock = FileLock::acquire(&lock_path).unwrap();
            assert!(lock.path().exists());
        }

        // Released on drop, so a second owner succeeds.
        let _again = FileLock::acquire(&lock_path).unwrap();
    }

    #[test]
    fn test_lock_prevents_double_acquire() {
        let dir = tempdir().unwrap();
        let lock_path = dir.path().join("corrections.log.lock");

        let _lock1 = FileLock::acquire(&lock_path).unwrap();

        let err = FileLock::acquire(&lock_path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WouldBlock);
    }

    #[cfg(not(any(unix, windows)))]
    #[test]
    fn test_unlocked_platform_is_refused() {
        let dir = tempdir().unwrap();
        let err = FileLock::acquire(&dir.path().join("corrections.log.lock")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }
}
