use crate::error::{AppResult, UserError};
use anyhow::Context;
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub const LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Exclusive advisory lock on a sentinel file inside the install root.
/// Held for the whole of a mutating command and released on drop.
pub struct InstallLock {
    file: File,
    path: PathBuf,
}

impl InstallLock {
    #[tracing::instrument(skip_all, fields(lock = %lock_path.display()))]
    pub async fn acquire(lock_path: &Path, timeout: Duration) -> AppResult<Self> {
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create lock directory: {}", parent.display()))?;
        }

        let file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path)
            .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;

        let start = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    tracing::debug!("Acquired install lock");
                    return Ok(Self {
                        file,
                        path: lock_path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    if start.elapsed() >= timeout {
                        return Err(UserError::LockHeld {
                            path: lock_path.to_path_buf(),
                        }
                        .into());
                    }
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to lock {}", lock_path.display())
                    });
                }
            }
        }
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(lock = %self.path.display(), error = %e, "Failed to release install lock");
        } else {
            tracing::trace!(lock = %self.path.display(), "Released install lock");
        }
    }
}
