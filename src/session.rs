//! One invocation's worth of repositories, plugins and caches.
//!
//! A [`Session`] is built once from the [`Config`] and owns every instance
//! the pipeline needs. Its methods are the pipeline steps:
//!
//! ```text
//! resolve ──► build_graph ──► fetch_and_install ──► generate
//! ```

use crate::cache::{ProductCache, VersionedCache};
use crate::config::{Config, RepositorySource};
use crate::core::scoped;
use crate::fetch::{ArchiveFetcher, Containerizer, FetchEngine};
use crate::generator::{GeneratedProduct, Generators};
use crate::graph::PackageGraph;
use crate::installer::Installers;
use crate::models::Requirement;
use crate::repository::{
    DriverContext, LocalRepository, RemoteRepository, Repository, RepositoryCaches, RepositoryDriver,
    create_driver,
};
use crate::resolver::{Resolution, Resolver};
use crate::translator::Translators;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

/// Everything configured for one invocation.
pub struct Session {
    repositories: Vec<Repository>,
    local: Vec<bool>,
    translators: Translators,
    installers: Installers,
    generators: Generators,
    containerizer: Containerizer,
    products: ProductCache,
    archives: ArchiveFetcher,
}

impl Session {
    /// Instantiates everything `config` names.
    ///
    /// Repositories are opened concurrently; the first failure aborts.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let translators = Translators::from_config(&config.translators)?;
        let installers = Installers::from_config(&config.installers)?;
        let generators = Generators::from_config(&config.generators)?;

        let repositories = scoped(config.repositories.iter().enumerate().map(|(index, repository)| async move {
            let name = repository.display_name(index);
            let cache_dir = config.repository_cache_dir(index)?;
            let backend: Arc<dyn RepositoryDriver> = match &repository.source {
                RepositorySource::Local {
                    driver,
                    parameters,
                } => {
                    let context = DriverContext {
                        parameters: parameters.clone(),
                        base_dir: config.base_dir.clone(),
                    };
                    let driver = create_driver(driver, context)
                        .await
                        .with_context(|| format!("Failed to open repository '{name}'"))?;
                    Arc::new(LocalRepository::new(driver))
                }
                RepositorySource::Remote {
                    url,
                } => Arc::new(RemoteRepository::new(url, VersionedCache::new(cache_dir.join("http")))?),
            };
            Repository::create(name, backend, RepositoryCaches::in_dir(&cache_dir)).await
        }))
        .await?;

        let local = config
            .repositories
            .iter()
            .map(|r| matches!(r.source, RepositorySource::Local { .. }))
            .collect();

        tracing::debug!(target: "session", "Session with {} repositories", repositories.len());

        Ok(Self {
            repositories,
            local,
            translators,
            installers,
            generators,
            containerizer: Containerizer::new(config.containerizer.clone()),
            products: ProductCache::new(config.products_dir()?),
            archives: ArchiveFetcher::new()?,
        })
    }

    /// The opened repositories, in configuration order.
    pub fn repositories(&self) -> &[Repository] {
        &self.repositories
    }

    /// Resolves `requirement`, handing `options` to every repository.
    pub async fn resolve(&self, requirement: &Requirement, options: &serde_json::Value) -> Result<Resolution> {
        Resolver::new(&self.repositories, &self.translators).resolve(requirement, options).await
    }

    /// Builds the dependency graph of a resolution.
    pub async fn build_graph(&self, resolution: &Resolution) -> Result<PackageGraph> {
        PackageGraph::build(&self.repositories, &resolution.translated_options, &resolution.model).await
    }

    /// Fetches and installs `graph` into `destination`.
    ///
    /// Meta builds resolve their environment with `build_options`.
    pub async fn fetch_and_install(
        &self,
        graph: &PackageGraph,
        resolution: &Resolution,
        build_options: &serde_json::Value,
        destination: &Path,
    ) -> Result<Vec<GeneratedProduct>> {
        let engine = FetchEngine::new(
            &self.repositories,
            &self.translators,
            &self.installers,
            &self.products,
            &self.archives,
            &self.containerizer,
            build_options,
        );
        let products = engine.fetch_and_install(graph, &resolution.translated_options, destination).await?;
        Ok(products
            .into_iter()
            .map(|(package, product)| GeneratedProduct {
                package,
                path: product.path,
                installer: product.installer,
            })
            .collect())
    }

    /// Runs the generators `names` into `output`.
    pub async fn generate(&self, names: &[String], products: &[GeneratedProduct], output: &Path) -> Result<()> {
        self.generators.generate(names, products, output).await
    }

    /// Re-indexes every local repository.
    ///
    /// Remote repositories update themselves; they are skipped.
    pub async fn update(&self) -> Result<usize> {
        let local: Vec<&Repository> = self
            .repositories
            .iter()
            .zip(&self.local)
            .filter_map(|(repository, local)| local.then_some(repository))
            .collect();
        scoped(local.iter().map(|repository| async move {
            repository.update().await?;
            tracing::info!(target: "session", "Updated {}", repository.name());
            Ok(())
        }))
        .await?;
        Ok(local.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepositoryConfig;
    use crate::installer::InstallerConfig;
    use crate::test_utils::write_chain_index;
    use tempfile::TempDir;

    fn config(temp: &TempDir) -> Config {
        let index = write_chain_index(temp.path(), "simple").unwrap();
        let mut config = Config {
            data_path: Some(temp.path().join("data").display().to_string()),
            base_dir: temp.path().to_path_buf(),
            ..Config::default()
        };
        config.repositories.push(RepositoryConfig {
            name: Some("chain".to_string()),
            source: RepositorySource::Local {
                driver: "index".to_string(),
                parameters: serde_json::json!({"index": index}),
            },
        });
        config.installers.insert(
            "simple".to_string(),
            InstallerConfig {
                kind: "directory".to_string(),
                parameters: serde_json::Value::Null,
            },
        );
        config
    }

    #[tokio::test]
    async fn test_pipeline() {
        crate::test_utils::init_test_logging(None);
        let temp = TempDir::new().unwrap();
        let session = Session::from_config(&config(&temp)).await.unwrap();
        assert_eq!(session.repositories()[0].name(), "chain");

        let resolution = session.resolve(&Requirement::noop("p3"), &serde_json::Value::Null).await.unwrap();
        assert_eq!(resolution.model.iter().map(String::as_str).collect::<Vec<_>>(), ["p1", "p2", "p3"]);

        let graph = session.build_graph(&resolution).await.unwrap();
        let root = temp.path().join("root");
        let products = session.fetch_and_install(&graph, &resolution, &serde_json::Value::Null, &root).await.unwrap();
        assert_eq!(products.len(), 3);
        assert!(root.join("p1.txt").exists() && root.join("p3.txt").exists());
    }

    #[tokio::test]
    async fn test_update_touches_local_repositories() {
        let temp = TempDir::new().unwrap();
        let session = Session::from_config(&config(&temp)).await.unwrap();
        assert_eq!(session.update().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_installer_kind() {
        let temp = TempDir::new().unwrap();
        let mut config = config(&temp);
        config.installers.insert(
            "odd".to_string(),
            InstallerConfig {
                kind: "rpm".to_string(),
                parameters: serde_json::Value::Null,
            },
        );
        assert!(Session::from_config(&config).await.is_err());
    }
}
