//! A repository driver backed by a JSON index file.
//!
//! The index lists packages, formula clauses and translator symbols:
//!
//! ```json
//! {
//!   "packages": [
//!     {
//!       "name": "p2",
//!       "version": "1.0.0",
//!       "interfaces": ["p2"],
//!       "dependencies": ["p1"],
//!       "requirements": [{"translator": "noop", "value": "p1"}],
//!       "product": {"kind": "archive", "location": "products/p2", "installer": "simple"}
//!     }
//!   ],
//!   "formula": [[{"translator": "noop", "value": "p1"}]],
//!   "translators": {"pp-p2": [{"version": "1.0.0"}]}
//! }
//! ```
//!
//! Package names are the solver variables and must be unique across all
//! configured repositories. A package's `requirements` become the clause
//! `name -> (r1 & r2 & ..)`. Relative archive locations resolve against the
//! directory containing the index.
//!
//! Product info is the declared `product_info`, with `{"version": ..}` for
//! every interface that declares none. When the package has dependencies,
//! their product info is embedded under `dependencies` in each object entry
//! and, so that it always reaches the cache key, under the
//! [`DEPENDENCIES_ENTRY`] entry as well.
//!
//! The epoch is the SHA-256 of the index bytes as last loaded; [`update`]
//! re-reads the file.
//!
//! [`update`]: RepositoryDriver::update

use super::{EpochStream, RepositoryDriver};
use crate::core::PpError;
use crate::models::{
    BuildContextDetail, Clause, DependencyProductInfos, PackageDetail, ProductDetail, ProductInfo,
    Requirement, SymbolAttributes, TranslatorInfo,
};
use crate::utils::hash::sha256_hex;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// One package entry of an index file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexPackage {
    /// Solver variable name
    pub name: String,
    /// Version, used as default product metadata
    #[serde(default)]
    pub version: Option<String>,
    /// Provided capabilities
    #[serde(default)]
    pub interfaces: BTreeSet<String>,
    /// Required capabilities
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
    /// Requirements that must hold whenever this package is selected
    #[serde(default)]
    pub requirements: Vec<Requirement>,
    /// How the product is obtained
    pub product: ProductDetail,
    /// Declared product metadata per capability
    #[serde(default)]
    pub product_info: ProductInfo,
}

/// Product info entry holding the product info of all dependencies.
pub const DEPENDENCIES_ENTRY: &str = "@dependencies";

/// The index file format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexFile {
    /// Packages
    #[serde(default)]
    pub packages: Vec<IndexPackage>,
    /// Additional clauses
    #[serde(default)]
    pub formula: Vec<Clause>,
    /// Translator symbols
    #[serde(default)]
    pub translators: BTreeMap<String, Vec<SymbolAttributes>>,
}

struct LoadedIndex {
    epoch: String,
    packages: BTreeMap<String, IndexPackage>,
    formula: Vec<Clause>,
    translators: Vec<TranslatorInfo>,
}

impl LoadedIndex {
    fn package(&self, name: &str) -> Result<&IndexPackage> {
        self.packages.get(name).ok_or_else(|| {
            PpError::InvariantViolation {
                message: format!("package '{name}' is not in the index"),
            }
            .into()
        })
    }
}

/// Driver over an index file.
pub struct IndexDriver {
    path: PathBuf,
    state: RwLock<Arc<LoadedIndex>>,
}

impl IndexDriver {
    /// Loads the index at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = load(&path).await?;
        Ok(Self {
            path,
            state: RwLock::new(Arc::new(state)),
        })
    }

    async fn snapshot(&self) -> Arc<LoadedIndex> {
        self.state.read().await.clone()
    }
}

async fn load(path: &Path) -> Result<LoadedIndex> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read repository index: {}", path.display()))?;
    let index: IndexFile = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse repository index: {}", path.display()))?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let mut packages = BTreeMap::new();
    for mut package in index.packages {
        if let ProductDetail::Archive {
            location,
            ..
        } = &mut package.product
        {
            *location = resolve_location(base, location);
        }
        if packages.contains_key(&package.name) {
            return Err(PpError::ConfigError {
                message: format!("duplicate package '{}' in {}", package.name, path.display()),
            }
            .into());
        }
        packages.insert(package.name.clone(), package);
    }

    let translators = index
        .translators
        .into_iter()
        .flat_map(|(symbol, candidates)| {
            candidates.into_iter().map(move |attributes| TranslatorInfo {
                symbol: symbol.clone(),
                attributes,
            })
        })
        .collect();

    let loaded = LoadedIndex {
        epoch: sha256_hex([&bytes]),
        packages,
        formula: index.formula,
        translators,
    };
    tracing::debug!(
        target: "repository",
        "Loaded index {} ({} packages, epoch {})",
        path.display(),
        loaded.packages.len(),
        &loaded.epoch[..12]
    );
    Ok(loaded)
}

fn resolve_location(base: &Path, location: &str) -> String {
    let is_url = location.contains("://");
    let path = Path::new(location);
    if is_url || path.is_absolute() {
        location.to_string()
    } else {
        base.join(path).to_string_lossy().into_owned()
    }
}

impl RepositoryDriver for IndexDriver {
    fn get_epoch(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move { Ok(self.snapshot().await.epoch.clone()) })
    }

    fn fetch_translator_data(&self) -> BoxFuture<'_, Result<EpochStream<'_, TranslatorInfo>>> {
        Box::pin(async move {
            let state = self.snapshot().await;
            Ok(EpochStream::from_vec(state.epoch.clone(), state.translators.clone()))
        })
    }

    fn translate_options(
        &self,
        options: serde_json::Value,
    ) -> BoxFuture<'_, Result<(String, serde_json::Value)>> {
        Box::pin(async move { Ok((self.snapshot().await.epoch.clone(), options)) })
    }

    fn get_formula<'a>(
        &'a self,
        _translated_options: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<EpochStream<'a, Clause>>> {
        Box::pin(async move {
            let state = self.snapshot().await;
            let mut clauses = state.formula.clone();
            for package in state.packages.values().filter(|p| !p.requirements.is_empty()) {
                clauses.push(vec![Requirement::implies(
                    Requirement::noop(package.name.clone()),
                    Requirement::all(package.requirements.clone()),
                )]);
            }
            Ok(EpochStream::from_vec(state.epoch.clone(), clauses))
        })
    }

    fn get_package_detail<'a>(
        &'a self,
        _translated_options: &'a serde_json::Value,
        package: &'a str,
    ) -> BoxFuture<'a, Result<Option<PackageDetail>>> {
        Box::pin(async move {
            let state = self.snapshot().await;
            Ok(state.packages.get(package).map(|p| PackageDetail {
                interfaces: p.interfaces.clone(),
                dependencies: p.dependencies.clone(),
                product: p.product.clone(),
            }))
        })
    }

    fn get_build_context<'a>(
        &'a self,
        _translated_options: &'a serde_json::Value,
        package: &'a str,
        _runtime_product_infos: &'a DependencyProductInfos,
    ) -> BoxFuture<'a, Result<BuildContextDetail>> {
        Box::pin(async move {
            let state = self.snapshot().await;
            Ok(state.package(package)?.product.clone().into())
        })
    }

    fn compute_product_info<'a>(
        &'a self,
        _translated_options: &'a serde_json::Value,
        package: &'a str,
        runtime_product_infos: &'a DependencyProductInfos,
    ) -> BoxFuture<'a, Result<ProductInfo>> {
        Box::pin(async move {
            let state = self.snapshot().await;
            let package = state.package(package)?;

            let mut info = package.product_info.clone();
            for interface in &package.interfaces {
                info.entry(interface.clone())
                    .or_insert_with(|| serde_json::json!({ "version": package.version }));
            }

            if !runtime_product_infos.is_empty() {
                let dependencies = serde_json::to_value(runtime_product_infos)?;
                for value in info.values_mut() {
                    if let serde_json::Value::Object(map) = value {
                        map.insert("dependencies".to_string(), dependencies.clone());
                    }
                }
                info.insert(DEPENDENCIES_ENTRY.to_string(), dependencies);
            }
            Ok(info)
        })
    }

    fn update(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let reloaded = load(&self.path).await?;
            *self.state.write().await = Arc::new(reloaded);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ProductCache;
    use futures::TryStreamExt;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_index(dir: &Path, index: serde_json::Value) -> PathBuf {
        let path = dir.join("index.json");
        std::fs::write(&path, serde_json::to_vec_pretty(&index).unwrap()).unwrap();
        path
    }

    fn sample() -> serde_json::Value {
        json!({
            "packages": [
                {
                    "name": "p1", "version": "1.0.0", "interfaces": ["p1"],
                    "product": {"kind": "archive", "location": "products/p1", "installer": "simple"}
                },
                {
                    "name": "p2", "version": "2.0.0", "interfaces": ["p2"], "dependencies": ["p1"],
                    "requirements": [{"translator": "noop", "value": "p1"}],
                    "product": {"kind": "archive", "location": "https://example.com/p2.zip", "installer": "zip"}
                }
            ],
            "translators": {"pp-p1": [{"version": "1.0.0"}]}
        })
    }

    #[tokio::test]
    async fn test_formula_contains_package_requirements() {
        let temp = TempDir::new().unwrap();
        let driver = IndexDriver::open(write_index(temp.path(), sample())).await.unwrap();

        let stream = driver.get_formula(&serde_json::Value::Null).await.unwrap();
        let clauses: Vec<Clause> = stream.items.try_collect().await.unwrap();
        assert_eq!(
            clauses,
            vec![vec![Requirement::implies(
                Requirement::noop("p2"),
                Requirement::all(vec![Requirement::noop("p1")])
            )]]
        );
    }

    #[tokio::test]
    async fn test_relative_locations_resolve_against_index() {
        let temp = TempDir::new().unwrap();
        let driver = IndexDriver::open(write_index(temp.path(), sample())).await.unwrap();
        let options = serde_json::Value::Null;

        let detail = driver.get_package_detail(&options, "p1").await.unwrap().unwrap();
        let ProductDetail::Archive {
            location, ..
        } = detail.product
        else {
            panic!("expected archive");
        };
        assert_eq!(PathBuf::from(location), temp.path().join("products/p1"));

        let context = driver.get_build_context(&options, "p2", &DependencyProductInfos::new()).await.unwrap();
        assert!(matches!(
            context,
            BuildContextDetail::Archive { ref location, .. } if location == "https://example.com/p2.zip"
        ));
        assert!(driver.get_package_detail(&options, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_product_info_embeds_dependencies() {
        let temp = TempDir::new().unwrap();
        let driver = IndexDriver::open(write_index(temp.path(), sample())).await.unwrap();
        let options = serde_json::Value::Null;

        let leaf = driver.compute_product_info(&options, "p1", &DependencyProductInfos::new()).await.unwrap();
        assert_eq!(leaf["p1"], json!({"version": "1.0.0"}));

        let mut runtime = DependencyProductInfos::new();
        runtime.entry("p1".to_string()).or_default().insert("p1".to_string(), leaf["p1"].clone());
        let info = driver.compute_product_info(&options, "p2", &runtime).await.unwrap();
        assert_eq!(info["p2"]["version"], "2.0.0");
        assert_eq!(info["p2"]["dependencies"]["p1"]["p1"]["version"], "1.0.0");
        assert_eq!(info[DEPENDENCIES_ENTRY]["p1"]["p1"]["version"], "1.0.0");
    }

    #[tokio::test]
    async fn test_dependency_change_reaches_key_without_object_entries() {
        let temp = TempDir::new().unwrap();
        let mut index = sample();
        // p3 provides nothing and declares a scalar product info entry.
        index["packages"].as_array_mut().unwrap().push(json!({
            "name": "p3", "version": "3.0.0", "dependencies": ["p2"],
            "product_info": {"abi": "x86_64"},
            "product": {"kind": "archive", "location": "products/p3", "installer": "simple"}
        }));
        let driver = IndexDriver::open(write_index(temp.path(), index)).await.unwrap();
        let options = serde_json::Value::Null;

        let runtime = |version: &str| {
            let mut infos = DependencyProductInfos::new();
            infos.entry("p2".to_string()).or_default().insert("p2".to_string(), json!({ "version": version }));
            infos
        };
        let old = driver.compute_product_info(&options, "p3", &runtime("2.0.0")).await.unwrap();
        let new = driver.compute_product_info(&options, "p3", &runtime("2.0.1")).await.unwrap();

        assert_eq!(old["abi"], "x86_64");
        assert_ne!(ProductCache::key("p3", &old), ProductCache::key("p3", &new));

        let alone = driver.compute_product_info(&options, "p1", &DependencyProductInfos::new()).await.unwrap();
        assert!(!alone.contains_key(DEPENDENCIES_ENTRY));
    }

    #[tokio::test]
    async fn test_update_reloads_and_changes_epoch() {
        let temp = TempDir::new().unwrap();
        let path = write_index(temp.path(), sample());
        let driver = IndexDriver::open(&path).await.unwrap();
        let before = driver.get_epoch().await.unwrap();

        let mut changed = sample();
        changed["packages"][0]["version"] = json!("1.0.1");
        write_index(temp.path(), changed);

        assert_eq!(driver.get_epoch().await.unwrap(), before);
        driver.update().await.unwrap();
        assert_ne!(driver.get_epoch().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_duplicate_packages_are_rejected() {
        let temp = TempDir::new().unwrap();
        let mut index = sample();
        index["packages"][1]["name"] = json!("p1");

        let error = IndexDriver::open(write_index(temp.path(), index)).await.err().unwrap();
        assert!(matches!(error.downcast_ref::<PpError>(), Some(PpError::ConfigError { .. })));
    }
}
