//! File-based cache locking for mutual exclusion between kang processes.
//!
//! A build holds the cache lock exclusively while it materializes entries, so
//! two builds of the same project never stage the same entry at once. A plan
//! only reads entries that are already complete and shares the lock.
//!
//! The exclusive holder records who it is in the lock file, so a process that
//! finds the cache busy can say by whom.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const LOCK_FILENAME: &str = ".lock";

/// Version of the [`LockHolder`] record format.
const HOLDER_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
  Shared,
  Exclusive,
}

/// The process holding the cache exclusively, as recorded in the lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolder {
  pub version: u32,
  pub pid: u32,
  pub started_at_unix: u64,
  pub command: String,
  pub cache: PathBuf,
}

impl LockHolder {
  fn this_process(command: &str, cache: &Path) -> Self {
    let started_at_unix = SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .map(|since| since.as_secs())
      .unwrap_or_default();
    Self {
      version: HOLDER_VERSION,
      pid: std::process::id(),
      started_at_unix,
      command: command.to_string(),
      cache: cache.to_path_buf(),
    }
  }

  /// Replace the contents of `file` with this record.
  fn record(&self, mut file: &File) -> io::Result<()> {
    file.set_len(0)?;
    file.rewind()?;
    serde_json::to_writer_pretty(file, self).map_err(io::Error::other)?;
    file.flush()
  }

  /// The record in `file`, read from its start.
  fn read(mut file: &File) -> io::Result<Self> {
    file.rewind()?;
    serde_json::from_reader(io::BufReader::new(file)).map_err(io::Error::other)
  }
}

#[derive(Debug, Error)]
pub enum CacheLockError {
  #[error(
    "cache is in use by '{command}' (pid {pid}, started at unix time {started_at_unix}); \
     remove {} if no kang process is running",
    lock_path.display()
  )]
  Contention {
    command: String,
    pid: u32,
    started_at_unix: u64,
    lock_path: PathBuf,
  },

  #[error("cache is in use by another process; remove {} if no kang process is running", lock_path.display())]
  ContentionUnknown { lock_path: PathBuf },

  #[error("failed to create cache directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("failed to open lock file: {0}")]
  OpenFile(#[source] io::Error),

  #[error("failed to write lock metadata: {0}")]
  WriteMetadata(#[source] io::Error),

  #[error("failed to acquire lock: {0}")]
  LockFailed(#[source] io::Error),
}

/// A held lock on a cache directory, released on drop.
pub struct CacheLock {
  file: File,
  lock_path: PathBuf,
}

impl CacheLock {
  /// Try to take the lock on `cache` without blocking.
  ///
  /// An exclusive holder records itself as `command` in the lock file.
  pub fn acquire(cache: &Path, mode: LockMode, command: &str) -> Result<Self, CacheLockError> {
    fs::create_dir_all(cache).map_err(CacheLockError::CreateDir)?;
    let lock_path = cache.join(LOCK_FILENAME);
    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&lock_path)
      .map_err(CacheLockError::OpenFile)?;

    match try_lock(&file, mode) {
      Ok(()) => {}
      Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Err(contention(&lock_path)),
      Err(err) => return Err(CacheLockError::LockFailed(err)),
    }

    if mode == LockMode::Exclusive {
      LockHolder::this_process(command, cache)
        .record(&file)
        .map_err(CacheLockError::WriteMetadata)?;
    }
    debug!(lock = %lock_path.display(), ?mode, "acquired cache lock");

    Ok(CacheLock { file, lock_path })
  }

  /// The recorded holder, read through the held handle.
  ///
  /// Opening a second handle would fail on Windows, where locks are mandatory.
  pub fn holder(&self) -> io::Result<LockHolder> {
    LockHolder::read(&self.file)
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }
}

/// The error for a lock held elsewhere, naming the holder when it is known.
fn contention(lock_path: &Path) -> CacheLockError {
  let holder = File::open(lock_path).and_then(|file| LockHolder::read(&file));
  match holder {
    Ok(holder) => CacheLockError::Contention {
      command: holder.command,
      pid: holder.pid,
      started_at_unix: holder.started_at_unix,
      lock_path: lock_path.to_path_buf(),
    },
    Err(err) => {
      debug!(lock = %lock_path.display(), error = %err, "lock holder unknown");
      CacheLockError::ContentionUnknown {
        lock_path: lock_path.to_path_buf(),
      }
    }
  }
}

#[cfg(unix)]
fn try_lock(file: &File, mode: LockMode) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};

  let operation = if mode == LockMode::Exclusive {
    FlockOperation::NonBlockingLockExclusive
  } else {
    FlockOperation::NonBlockingLockShared
  };
  Ok(flock(file, operation)?)
}

#[cfg(windows)]
fn try_lock(file: &File, mode: LockMode) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::{ERROR_LOCK_VIOLATION, HANDLE};
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx};

  let handle = file.as_raw_handle() as HANDLE;
  let flags = match mode {
    LockMode::Shared => LOCKFILE_FAIL_IMMEDIATELY,
    LockMode::Exclusive => LOCKFILE_FAIL_IMMEDIATELY | LOCKFILE_EXCLUSIVE_LOCK,
  };

  // SAFETY: OVERLAPPED is plain data and valid when zeroed; the handle is open.
  let result = unsafe {
    let mut overlapped = std::mem::zeroed();
    LockFileEx(handle, flags, 0, 1, 0, &mut overlapped)
  };

  if result != 0 {
    return Ok(());
  }
  let err = io::Error::last_os_error();
  if err.raw_os_error() == Some(ERROR_LOCK_VIOLATION as i32) {
    return Err(io::ErrorKind::WouldBlock.into());
  }
  Err(err)
}
