//! Cross-process file locks for cache keys.
//!
//! A [`CacheLock`] holds an exclusive OS lock on `{cache_dir}/.locks/{name}.lock`
//! until dropped. Acquisition blocks on tokio's blocking pool so the runtime
//! keeps making progress while another process holds the lock.

use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// An exclusive lock on one cache key.
pub struct CacheLock {
    file: File,
    path: PathBuf,
}

impl CacheLock {
    /// Acquires the lock named `name` inside `cache_dir`, waiting as long as needed.
    ///
    /// # Errors
    ///
    /// Fails if the `.locks` directory or the lock file cannot be created, or
    /// the file system does not support locking.
    pub async fn acquire(cache_dir: &Path, name: &str) -> Result<Self> {
        let locks_dir = cache_dir.join(".locks");
        tokio::fs::create_dir_all(&locks_dir).await.with_context(|| {
            format!("Failed to create locks directory: {}", locks_dir.display())
        })?;

        let path = locks_dir.join(format!("{name}.lock"));
        let lock_path = path.clone();
        let name = name.to_string();

        let file = tokio::task::spawn_blocking(move || -> Result<File> {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(&lock_path)
                .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;

            file.lock_exclusive().with_context(|| format!("Failed to acquire lock for: {name}"))?;

            Ok(file)
        })
        .await
        .context("Failed to spawn blocking task for lock acquisition")??;

        tracing::trace!(target: "cache", "Acquired lock {}", path.display());

        Ok(Self {
            file,
            path,
        })
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        #[allow(unstable_name_collisions)]
        if let Err(e) = self.file.unlock() {
            tracing::warn!(target: "cache", "Failed to unlock {}: {}", self.path.display(), e);
        }
    }
}
