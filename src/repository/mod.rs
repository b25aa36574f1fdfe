//! Package repositories
//!
//! A repository is one package source. It publishes:
//!
//! - an **epoch**, an opaque freshness token that changes whenever its data does
//! - **translator data**, the symbol universe translators resolve requirements against
//! - a **formula**, clauses relating its package variables
//! - per-package **detail**, **build context** and **product info**
//!
//! # Layers
//!
//! ```text
//! Repository          caching wrapper, epoch checks (this module)
//!   └── dyn RepositoryDriver
//!         ├── LocalRepository   reader/writer lock around an in-process driver
//!         │     └── IndexDriver (or any registered driver)
//!         └── RemoteRepository  HTTP client with ETag/If-None-Match caching
//! ```
//!
//! [`RepositoryDriver`] is the plugin contract. [`Repository`] adds the
//! epoch-keyed caches: fully drained translator data and formula streams are
//! stored under the repository epoch, and a stream is only cached if the
//! epoch is unchanged when it ends. Otherwise the call fails with
//! [`PpError::EpochChanged`] and nothing is written.

pub mod index;
pub mod local;
pub mod registry;
pub mod remote;
pub mod wire;

pub use index::IndexDriver;
pub use local::LocalRepository;
pub use registry::{DriverContext, create_driver};
pub use remote::RemoteRepository;

use crate::cache::VersionedCache;
use crate::core::PpError;
use crate::models::{
    BuildContextDetail, Clause, DependencyProductInfos, PackageDetail, ProductInfo, TranslatorInfo,
};
use anyhow::{Context, Result};
use futures::TryStreamExt;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;

/// A stream opened against a repository, with the epoch observed when it was opened.
pub struct EpochStream<'a, T> {
    /// Epoch at the time the stream was opened
    pub epoch: String,
    /// The records
    pub items: BoxStream<'a, Result<T>>,
}

impl<'a, T: Send + 'a> EpochStream<'a, T> {
    /// A stream over already materialized records.
    pub fn from_vec(epoch: String, items: Vec<T>) -> Self {
        Self {
            epoch,
            items: Box::pin(futures::stream::iter(items.into_iter().map(Ok))),
        }
    }
}

/// The repository driver contract.
///
/// Implementations must be deterministic for a given epoch: two calls with
/// the same arguments under the same epoch return the same data.
pub trait RepositoryDriver: Send + Sync {
    /// Current freshness token.
    fn get_epoch(&self) -> BoxFuture<'_, Result<String>>;

    /// Streams the symbol universe for translators.
    fn fetch_translator_data(&self) -> BoxFuture<'_, Result<EpochStream<'_, TranslatorInfo>>>;

    /// Normalizes user options into the form other calls expect.
    fn translate_options(
        &self,
        options: serde_json::Value,
    ) -> BoxFuture<'_, Result<(String, serde_json::Value)>>;

    /// Streams the clauses relating this repository's package variables.
    fn get_formula<'a>(
        &'a self,
        translated_options: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<EpochStream<'a, Clause>>>;

    /// Detail of `package`, or `None` if the variable does not belong here.
    fn get_package_detail<'a>(
        &'a self,
        translated_options: &'a serde_json::Value,
        package: &'a str,
    ) -> BoxFuture<'a, Result<Option<PackageDetail>>>;

    /// How to obtain the product of `package`.
    fn get_build_context<'a>(
        &'a self,
        translated_options: &'a serde_json::Value,
        package: &'a str,
        runtime_product_infos: &'a DependencyProductInfos,
    ) -> BoxFuture<'a, Result<BuildContextDetail>>;

    /// Product metadata of `package` given its dependencies' metadata.
    fn compute_product_info<'a>(
        &'a self,
        translated_options: &'a serde_json::Value,
        package: &'a str,
        runtime_product_infos: &'a DependencyProductInfos,
    ) -> BoxFuture<'a, Result<ProductInfo>>;

    /// Re-indexes the underlying data.
    fn update(&self) -> BoxFuture<'_, Result<()>>;
}

/// Cache directories of one repository.
#[derive(Debug, Clone)]
pub struct RepositoryCaches {
    /// Translator data keyed by epoch
    pub translator_data: VersionedCache,
    /// Formulas keyed by epoch and translated options
    pub formula: VersionedCache,
}

impl RepositoryCaches {
    /// Standard layout below `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            translator_data: VersionedCache::new(dir.join("translator-data")),
            formula: VersionedCache::new(dir.join("formula")),
        }
    }
}

const TRANSLATOR_DATA_KEY: &str = "translator-data";

/// A repository with epoch-checked caching.
pub struct Repository {
    name: String,
    backend: Arc<dyn RepositoryDriver>,
    epoch: String,
    caches: RepositoryCaches,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository").field("name", &self.name).field("epoch", &self.epoch).finish()
    }
}

impl Repository {
    /// Wraps `backend`, recording its current epoch.
    pub async fn create(
        name: impl Into<String>,
        backend: Arc<dyn RepositoryDriver>,
        caches: RepositoryCaches,
    ) -> Result<Self> {
        let name = name.into();
        let epoch = backend
            .get_epoch()
            .await
            .with_context(|| format!("Failed to get epoch of repository '{name}'"))?;

        tracing::debug!(target: "repository", "Repository {} at epoch {}", name, epoch);

        Ok(Self {
            name,
            backend,
            epoch,
            caches,
        })
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Epoch observed when the repository was created.
    pub fn epoch(&self) -> &str {
        &self.epoch
    }

    fn check_epoch(&self, found: &str) -> Result<()> {
        if found != self.epoch {
            return Err(PpError::EpochChanged {
                repository: self.name.clone(),
                expected: self.epoch.clone(),
                found: found.to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn drain_cached<'a, T>(
        &'a self,
        cache: &VersionedCache,
        key: &str,
        open: BoxFuture<'a, Result<EpochStream<'a, T>>>,
    ) -> Result<Vec<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'a,
    {
        if let Some(items) = cache.get::<Vec<T>>(key, &self.epoch).await? {
            tracing::trace!(target: "repository", "{}: cache hit for {}", self.name, cache.dir().display());
            return Ok(items);
        }

        let stream = open.await?;
        self.check_epoch(&stream.epoch)?;
        let items: Vec<T> = stream.items.try_collect().await?;

        let closing = self.backend.get_epoch().await?;
        self.check_epoch(&closing)?;

        cache.put(key, &self.epoch, &items).await?;
        Ok(items)
    }

    /// Fully drained translator data.
    pub async fn fetch_translator_data(&self) -> Result<Vec<TranslatorInfo>> {
        self.drain_cached(
            &self.caches.translator_data,
            TRANSLATOR_DATA_KEY,
            self.backend.fetch_translator_data(),
        )
        .await
        .with_context(|| format!("Failed to fetch translator data of '{}'", self.name))
    }

    /// Translates user options, failing if the repository moved to a new epoch.
    pub async fn translate_options(&self, options: serde_json::Value) -> Result<serde_json::Value> {
        let (epoch, translated) = self
            .backend
            .translate_options(options)
            .await
            .with_context(|| format!("Failed to translate options of '{}'", self.name))?;
        self.check_epoch(&epoch)?;
        Ok(translated)
    }

    /// Fully drained formula for `translated_options`.
    pub async fn get_formula(&self, translated_options: &serde_json::Value) -> Result<Vec<Clause>> {
        let key = serde_json::to_string(translated_options)?;
        self.drain_cached(&self.caches.formula, &key, self.backend.get_formula(translated_options))
            .await
            .with_context(|| format!("Failed to fetch formula of '{}'", self.name))
    }

    /// Package detail, `None` if `package` is not from this repository.
    pub async fn get_package_detail(
        &self,
        translated_options: &serde_json::Value,
        package: &str,
    ) -> Result<Option<PackageDetail>> {
        self.backend.get_package_detail(translated_options, package).await.with_context(|| {
            format!("Failed to get detail of '{package}' from '{}'", self.name)
        })
    }

    /// Build context of `package`.
    pub async fn get_build_context(
        &self,
        translated_options: &serde_json::Value,
        package: &str,
        runtime_product_infos: &DependencyProductInfos,
    ) -> Result<BuildContextDetail> {
        self.backend
            .get_build_context(translated_options, package, runtime_product_infos)
            .await
            .with_context(|| {
                format!("Failed to get build context of '{package}' from '{}'", self.name)
            })
    }

    /// Product info of `package`.
    pub async fn compute_product_info(
        &self,
        translated_options: &serde_json::Value,
        package: &str,
        runtime_product_infos: &DependencyProductInfos,
    ) -> Result<ProductInfo> {
        self.backend
            .compute_product_info(translated_options, package, runtime_product_infos)
            .await
            .with_context(|| {
                format!("Failed to compute product info of '{package}' in '{}'", self.name)
            })
    }

    /// Re-indexes the repository.
    pub async fn update(&self) -> Result<()> {
        self.backend
            .update()
            .await
            .with_context(|| format!("Failed to update repository '{}'", self.name))
    }
}
