//! Run lock for pipeline exclusivity

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use strongbox_core::{BackupError, Result};

/// Exclusive token for one pipeline run.
///
/// Backed by an advisory `flock` on `<lock_dir>/<name>.lock`. The kernel
/// drops the flock when the process exits, however it exits, so a crash
/// never leaves a lock that needs manual cleanup. The file content only
/// names the holder; it never decides who holds the lock.
pub struct RunLock {
    path: PathBuf,
    name: String,
    #[allow(dead_code)]
    file: File,
}

/// Lock file content
#[derive(Debug, Serialize, Deserialize)]
struct LockContent {
    name: String,
    pid: u32,
    started_at: u64,
}

impl RunLock {
    /// Acquire the run lock without blocking.
    ///
    /// Fails with `AlreadyRunning` whenever another open file holds the
    /// flock. The reported pid is whatever the holder recorded, or 0 if it
    /// has not written its content yet.
    pub fn acquire(lock_dir: &Path, name: &str) -> Result<Self> {
        let lock_path = lock_path(lock_dir, name);

        std::fs::create_dir_all(lock_dir)
            .map_err(|e| BackupError::io("failed to create lock directory", e))?;

        let mut file = open_lock_file(&lock_path)?;

        if !try_flock_exclusive(&file)? {
            let pid = read_lock_content(&mut file).map(|c| c.pid).unwrap_or(0);
            return Err(BackupError::AlreadyRunning {
                name: name.to_string(),
                pid,
            });
        }

        write_lock_content(&mut file, name)?;
        tracing::debug!("Acquired run lock {}", lock_path.display());

        Ok(Self {
            path: lock_path,
            name: name.to_string(),
            file,
        })
    }

    /// Pid recorded by the process currently holding the lock, if any
    pub fn holder(lock_dir: &Path, name: &str) -> Result<Option<u32>> {
        let lock_path = lock_path(lock_dir, name);
        if !lock_path.exists() {
            return Ok(None);
        }

        let mut file = open_lock_file(&lock_path)?;
        if try_flock_exclusive(&file)? {
            // Nobody holds it; closing the file drops our own flock
            return Ok(None);
        }

        Ok(read_lock_content(&mut file).ok().map(|c| c.pid))
    }

    /// Release the lock before the process exits
    pub fn release(self) {
        tracing::debug!("Released run lock {}", self.path.display());
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn lock_path(lock_dir: &Path, name: &str) -> PathBuf {
    lock_dir.join(format!("{}.lock", name))
}

fn open_lock_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| BackupError::io(format!("failed to open lock file {}", path.display()), e))
}

/// Write lock content (name + PID + timestamp)
fn write_lock_content(file: &mut File, name: &str) -> Result<()> {
    let content = LockContent {
        name: name.to_string(),
        pid: std::process::id(),
        started_at: current_timestamp_ms(),
    };

    let serialized = serde_json::to_string(&content)
        .map_err(|e| BackupError::io("failed to serialize lock content", e.into()))?;

    let write = |file: &mut File| -> std::io::Result<()> {
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(serialized.as_bytes())?;
        file.sync_all()
    };
    write(file).map_err(|e| BackupError::io("failed to write lock file", e))
}

/// Read lock content from file
fn read_lock_content(file: &mut File) -> std::io::Result<LockContent> {
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).map_err(std::io::Error::from)
}

/// Try to acquire exclusive file lock (non-blocking)
#[cfg(unix)]
fn try_flock_exclusive(file: &File) -> Result<bool> {
    use nix::fcntl::{flock, FlockArg};
    use std::os::unix::io::AsRawFd;

    match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
        Ok(_) => Ok(true),
        Err(nix::errno::Errno::EWOULDBLOCK) => Ok(false),
        Err(e) => Err(BackupError::io("flock failed", e.into())),
    }
}

/// Get current timestamp in milliseconds
fn current_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
