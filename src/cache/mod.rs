//! On-disk caches
//!
//! Two caches persist across invocations:
//!
//! - [`VersionedCache`]: metadata (translator data, formulas, remote HTTP
//!   responses) keyed by an arbitrary string and tagged with the repository
//!   epoch it was read under. A lookup names the version it expects and only a
//!   matching entry is returned; nothing is ever invalidated implicitly.
//! - [`ProductCache`]: built products addressed by a hash of the package name
//!   and its computed product metadata.
//!
//! # Layout
//!
//! ```text
//! {data_path}/
//! ├── repositories/{index}/translator-data/{sha256(key)}.json
//! ├── repositories/{index}/formula/{sha256(key)}.json
//! ├── repositories/{index}/http/{sha256(url)}.json
//! └── products/
//!     ├── .locks/{hash}.lock
//!     ├── entries/{hash}.json
//!     └── store/{hash}/product
//! ```
//!
//! Cache handles are plain values created by the session and injected into
//! the components that need them.

pub mod lock;
pub mod product;

pub use lock::CacheLock;
pub use product::{CachedProduct, ProductCache, ProductLease};

use crate::core::PpError;
use crate::utils::fs::atomic_write_async;
use crate::utils::hash::sha256_hex;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize)]
struct Entry<T> {
    key: String,
    version: String,
    value: T,
}

/// A directory of JSON entries, each tagged with a version.
#[derive(Debug, Clone)]
pub struct VersionedCache {
    dir: PathBuf,
}

impl VersionedCache {
    /// A cache rooted at `dir`; the directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
        }
    }

    /// The cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sha256_hex([key])))
    }

    async fn read_entry<T: DeserializeOwned>(&self, key: &str) -> Result<Option<Entry<T>>> {
        let path = self.entry_path(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read cache entry: {}", path.display()));
            }
        };

        let entry: Entry<T> = serde_json::from_slice(&bytes).map_err(|e| PpError::InvariantViolation {
            message: format!("corrupt cache entry {}: {e}", path.display()),
        })?;

        // Distinct keys hashing to one file would be a collision; treat as a miss.
        if entry.key != key {
            return Ok(None);
        }
        Ok(Some(entry))
    }

    /// Returns the value stored for `key` if it was written under `version`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str, version: &str) -> Result<Option<T>> {
        let entry = self.read_entry::<T>(key).await?;
        Ok(entry.filter(|e| e.version == version).map(|e| e.value))
    }

    /// Returns the value stored for `key` together with the version it was written under.
    pub async fn peek<T: DeserializeOwned>(&self, key: &str) -> Result<Option<(String, T)>> {
        let entry = self.read_entry::<T>(key).await?;
        Ok(entry.map(|e| (e.version, e.value)))
    }

    /// Stores `value` for `key` under `version`, replacing any previous entry.
    pub async fn put<T: Serialize>(&self, key: &str, version: &str, value: &T) -> Result<()> {
        let entry = Entry {
            key: key.to_string(),
            version: version.to_string(),
            value,
        };
        let bytes = serde_json::to_vec(&entry).context("Failed to serialize cache entry")?;
        atomic_write_async(&self.entry_path(key), bytes).await?;
        tracing::trace!(target: "cache", "Stored {} @ {}", key, version);
        Ok(())
    }
}
