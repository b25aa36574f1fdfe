//! Content-addressed product cache.
//!
//! A product is addressed by `sha256(package || canonical_json(product_info))`.
//! Because product metadata of a package embeds the metadata of its
//! dependencies, a change anywhere below a package changes its address.
//! Meta build products additionally hash the packages of their resolved
//! build environment ([`ProductCache::build_key`]).
//!
//! Writers follow a lease protocol:
//!
//! 1. [`ProductCache::lease`] takes the per-key lock (in-process mutex plus a
//!    cross-process file lock).
//! 2. [`ProductLease::get`] checks for an existing entry.
//! 3. On a miss, [`ProductLease::staging`] creates a private directory that
//!    the fetch writes `product` into.
//! 4. [`ProductLease::commit`] moves the directory into the store and writes
//!    the entry. A staging directory that is never committed is removed.

use super::lock::CacheLock;
use crate::constants::PRODUCT_FILE;
use crate::core::PpError;
use crate::models::{ProductInfo, canonical_product_info};
use crate::utils::fs::{atomic_write_async, remove_dir_all_async};
use crate::utils::hash::sha256_hex;
use anyhow::{Context, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A committed product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedProduct {
    /// Absolute path of the product artifact (file or directory)
    pub path: PathBuf,
    /// Installer tag the product must be installed with
    pub installer: String,
}

#[derive(Serialize, Deserialize)]
struct ProductEntry {
    package: String,
    installer: String,
}

/// Handle to the product cache directory.
#[derive(Clone)]
pub struct ProductCache {
    root: PathBuf,
    key_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl ProductCache {
    /// A cache rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            key_locks: Arc::new(DashMap::new()),
        }
    }

    /// The cache root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Content address of `package` with metadata `info`.
    pub fn key(package: &str, info: &ProductInfo) -> String {
        sha256_hex([package, canonical_product_info(info).as_str()])
    }

    /// Content address of a product built in an environment of `packages`.
    pub fn build_key(package: &str, info: &ProductInfo, packages: &BTreeSet<String>) -> String {
        let environment = serde_json::json!({ "packages": packages }).to_string();
        sha256_hex([package, canonical_product_info(info).as_str(), environment.as_str()])
    }

    /// Takes exclusive ownership of `key` until the lease is dropped.
    pub async fn lease(&self, key: &str, package: &str) -> Result<ProductLease> {
        let mutex = self
            .key_locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        let file_lock = CacheLock::acquire(&self.root, key).await?;

        Ok(ProductLease {
            cache: self.clone(),
            key: key.to_string(),
            package: package.to_string(),
            _guard: guard,
            _file_lock: file_lock,
        })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join("entries").join(format!("{key}.json"))
    }

    fn store_path(&self, key: &str) -> PathBuf {
        self.root.join("store").join(key)
    }
}

/// Exclusive access to one product cache key.
pub struct ProductLease {
    cache: ProductCache,
    key: String,
    package: String,
    _guard: OwnedMutexGuard<()>,
    _file_lock: CacheLock,
}

impl ProductLease {
    /// The cache key this lease covers.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the committed product, if any.
    ///
    /// # Errors
    ///
    /// An entry that cannot be parsed or whose product is gone is reported as
    /// [`PpError::InvariantViolation`].
    pub async fn get(&self) -> Result<Option<CachedProduct>> {
        let path = self.cache.entry_path(&self.key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read product entry: {}", path.display()));
            }
        };

        let entry: ProductEntry =
            serde_json::from_slice(&bytes).map_err(|e| PpError::InvariantViolation {
                message: format!("corrupt product cache entry {}: {e}", path.display()),
            })?;

        let product = self.cache.store_path(&self.key).join(PRODUCT_FILE);
        if !product.exists() {
            return Err(PpError::InvariantViolation {
                message: format!(
                    "product cache entry for '{}' points to missing {}",
                    entry.package,
                    product.display()
                ),
            }
            .into());
        }

        Ok(Some(CachedProduct {
            path: product,
            installer: entry.installer,
        }))
    }

    /// Creates a private directory to build the product in.
    ///
    /// The product must be written to `staging.path().join("product")`.
    pub async fn staging(&self) -> Result<tempfile::TempDir> {
        let parent = self.cache.root.join("staging");
        tokio::fs::create_dir_all(&parent)
            .await
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

        let prefix = format!("{}-", sanitize(&self.package));
        tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(&parent)
            .with_context(|| format!("Failed to create staging directory in {}", parent.display()))
    }

    /// Moves a staged product into the store and records it.
    pub async fn commit(&self, staging: tempfile::TempDir, installer: &str) -> Result<CachedProduct> {
        let produced = staging.path().join(PRODUCT_FILE);
        if !produced.exists() {
            return Err(PpError::BuildFailed {
                package: self.package.clone(),
                reason: format!("no product at {}", produced.display()),
            }
            .into());
        }

        let store = self.cache.store_path(&self.key);
        // Leftover from an entry that was never recorded.
        remove_dir_all_async(&store).await?;
        if let Some(parent) = store.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        tokio::fs::rename(staging.path(), &store).await.with_context(|| {
            format!("Failed to move {} into {}", staging.path().display(), store.display())
        })?;

        let entry = ProductEntry {
            package: self.package.clone(),
            installer: installer.to_string(),
        };
        let bytes = serde_json::to_vec(&entry).context("Failed to serialize product entry")?;
        atomic_write_async(&self.cache.entry_path(&self.key), bytes).await?;

        tracing::debug!(target: "cache", "Committed product of {} as {}", self.package, self.key);

        Ok(CachedProduct {
            path: store.join(PRODUCT_FILE),
            installer: installer.to_string(),
        })
    }
}

fn sanitize(name: &str) -> String {
    name.chars().map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' }).collect()
}
