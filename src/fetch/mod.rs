//! Fetching products and installing them into a root.
//!
//! The fetch pass walks the dependency graph generation by generation. For
//! each node it:
//!
//! 1. collects the product info of the node's direct dependencies (memoized
//!    from earlier generations) as [`DependencyProductInfos`],
//! 2. asks the node's repository for its own product info and build context,
//! 3. hashes package name and product info (plus, for meta builds, the
//!    resolved build environment) into a product cache key,
//! 4. reuses the cached product, or obtains it from the build context
//!    (archive download or [`meta`] build) and commits it.
//!
//! Fetched products are handed to the install pass through one channel per
//! node, so both passes run concurrently. [`FetchEngine::fetch_and_install`]
//! installs into a staged copy of the destination that only replaces it when
//! both passes succeed.

pub mod archive;
pub mod containerizer;
pub mod meta;
pub mod waits;

pub use archive::ArchiveFetcher;
pub use containerizer::{Containerizer, ContainerizerConfig};

use crate::cache::{CachedProduct, ProductCache, ProductLease};
use crate::constants::PRODUCT_FILE;
use crate::core::{PpError, scoped};
use crate::graph::{GraphNode, PackageGraph};
use crate::installer::{InstallEngine, Installers, ProductReceivers};
use crate::models::{BuildContextDetail, DependencyProductInfos, ProductInfo};
use crate::repository::Repository;
use crate::resolver::Resolution;
use crate::translator::Translators;
use crate::utils::fs::StagedDir;
use crate::utils::progress::ProgressBar;
use anyhow::{Context, Result};
use petgraph::graph::NodeIndex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::oneshot;
use waits::{Build, LeaseWaits};

type ProductSenders = HashMap<NodeIndex, oneshot::Sender<CachedProduct>>;

/// Everything needed to obtain products: repositories, plugins and caches.
#[derive(Clone)]
pub struct FetchEngine<'a> {
    repositories: &'a [Repository],
    translators: &'a Translators,
    installers: &'a Installers,
    products: &'a ProductCache,
    archives: &'a ArchiveFetcher,
    containerizer: &'a Containerizer,
    build_options: &'a serde_json::Value,
    building: Vec<Build>,
    waits: Arc<LeaseWaits>,
}

impl<'a> FetchEngine<'a> {
    /// An engine over `repositories` storing products in `products`.
    ///
    /// `build_options` are the options meta builds resolve their environment
    /// with.
    pub fn new(
        repositories: &'a [Repository],
        translators: &'a Translators,
        installers: &'a Installers,
        products: &'a ProductCache,
        archives: &'a ArchiveFetcher,
        containerizer: &'a Containerizer,
        build_options: &'a serde_json::Value,
    ) -> Self {
        Self {
            repositories,
            translators,
            installers,
            products,
            archives,
            containerizer,
            build_options,
            building: Vec::new(),
            waits: Arc::new(LeaseWaits::default()),
        }
    }

    /// Fetches every product of `graph` and installs it into `destination`.
    ///
    /// The destination is replaced atomically on success and left untouched
    /// on failure. Products committed before a failure stay in the cache.
    ///
    /// Returns the fetched products in generation order.
    pub async fn fetch_and_install(
        &self,
        graph: &PackageGraph,
        translated_options: &[serde_json::Value],
        destination: &Path,
    ) -> Result<Vec<(String, CachedProduct)>> {
        let staged = StagedDir::prepare(destination).await?;
        let products = self.fetch_and_install_into(graph, translated_options, staged.path()).await?;
        staged.commit().await?;
        tracing::info!(target: "fetch", "Installed {} packages into {}", products.len(), destination.display());
        Ok(products)
    }

    /// Runs the fetch and install passes concurrently against `root`.
    async fn fetch_and_install_into(
        &self,
        graph: &PackageGraph,
        translated_options: &[serde_json::Value],
        root: &Path,
    ) -> Result<Vec<(String, CachedProduct)>> {
        let mut senders = ProductSenders::new();
        let mut receivers = ProductReceivers::new();
        for (idx, _) in graph.nodes() {
            let (tx, rx) = oneshot::channel();
            senders.insert(idx, tx);
            receivers.insert(idx, rx);
        }

        let installer = InstallEngine::new(self.installers);
        let (products, ()) = futures::try_join!(
            self.fetch_pass(graph, translated_options, senders),
            installer.install_pass(graph, root, receivers),
        )?;
        Ok(products)
    }

    /// Obtains the product of every node, dependencies first.
    ///
    /// Each product is sent to its node's channel as soon as it is available.
    async fn fetch_pass(
        &self,
        graph: &PackageGraph,
        translated_options: &[serde_json::Value],
        mut senders: ProductSenders,
    ) -> Result<Vec<(String, CachedProduct)>> {
        let progress = ProgressBar::new(graph.len() as u64);
        progress.set_prefix("Fetching");

        let mut infos: HashMap<NodeIndex, ProductInfo> = HashMap::new();
        let mut fetched = Vec::with_capacity(graph.len());

        for generation in graph.generations() {
            let memo = &infos;
            let nodes = generation.into_iter().map(|idx| {
                let sender = senders.remove(&idx);
                let progress = &progress;
                async move {
                    let node = graph.node(idx);
                    let dependency_infos = dependency_product_infos(graph, idx, memo);
                    let (info, product) =
                        self.fetch_node(graph, idx, translated_options, &dependency_infos).await?;
                    if let Some(sender) = sender {
                        // The install pass may already be gone; its error wins.
                        let _ = sender.send(product.clone());
                    }
                    progress.inc(1);
                    progress.set_message(node.package.clone());
                    Ok((idx, info, product))
                }
            });
            let results = scoped(nodes).await?;

            for (idx, info, product) in results {
                infos.insert(idx, info);
                fetched.push((graph.node(idx).package.clone(), product));
            }
        }

        progress.finish_and_clear();
        Ok(fetched)
    }

    async fn fetch_node(
        &self,
        graph: &PackageGraph,
        idx: NodeIndex,
        translated_options: &[serde_json::Value],
        dependency_infos: &DependencyProductInfos,
    ) -> Result<(ProductInfo, CachedProduct)> {
        let node = graph.node(idx);
        let repository = self.repository(node)?;
        let options = translated_options.get(node.repository).unwrap_or(&serde_json::Value::Null);

        let info = repository.compute_product_info(options, &node.package, dependency_infos).await?;
        let context = repository.get_build_context(options, &node.package, dependency_infos).await?;

        let (key, source) = match context {
            BuildContextDetail::Archive {
                location,
                installer,
            } => (ProductCache::key(&node.package, &info), Source::Archive {
                location,
                installer,
            }),
            BuildContextDetail::Meta {
                requirements,
                command,
                on_top,
            } => {
                let build = meta::MetaBuild {
                    requirements,
                    command,
                    on_top,
                };
                let environment = meta::resolve_environment(self, graph, idx, &build).await?;
                let key = ProductCache::build_key(&node.package, &info, &environment.model);
                (key, Source::Meta {
                    build,
                    environment,
                })
            }
        };

        let lease = self.lease(&key, &node.package).await?;
        if let Some(product) = lease.get().await? {
            tracing::debug!(target: "fetch", "{}: cached as {}", node.package, key);
            return Ok((info, product));
        }

        let staging = lease.staging().await?;
        let destination = staging.path().join(PRODUCT_FILE);

        let installer = match source {
            Source::Archive {
                location,
                installer,
            } => {
                tracing::info!(target: "fetch", "Fetching {} from {}", node.package, location);
                self.archives
                    .fetch(&location, &destination)
                    .await
                    .with_context(|| format!("Failed to fetch product of '{}'", node.package))?;
                installer
            }
            Source::Meta {
                build,
                environment,
            } => meta::build(self, graph, idx, &key, build, environment, &destination).await?,
        };

        let product = lease.commit(staging, &installer).await?;
        Ok((info, product))
    }

    /// Leases `key`, refusing leases that can never be granted because a
    /// build waiting on them holds them.
    async fn lease(&self, key: &str, package: &str) -> Result<ProductLease> {
        let _pending = self.waits.register(&self.building, key, package)?;
        self.products.lease(key, package).await
    }

    fn repository(&self, node: &GraphNode) -> Result<&'a Repository> {
        self.repositories.get(node.repository).ok_or_else(|| {
            PpError::InvariantViolation {
                message: format!("package '{}' refers to unknown repository #{}", node.package, node.repository),
            }
            .into()
        })
    }

    /// An engine for the build environment of `package`, whose product is
    /// leased as `key`.
    fn nested(&self, package: &str, key: &str) -> Result<Self> {
        if self.building.iter().any(|build| build.package == package) {
            let mut chain: Vec<&str> = self.building.iter().map(|build| build.package.as_str()).collect();
            chain.push(package);
            return Err(PpError::CircularDependency {
                chain: chain.join(" -> "),
            }
            .into());
        }
        let mut nested = self.clone();
        nested.building.push(Build {
            package: package.to_string(),
            key: key.to_string(),
        });
        Ok(nested)
    }
}

/// Where the product of a node comes from.
enum Source {
    Archive {
        location: String,
        installer: String,
    },
    Meta {
        build: meta::MetaBuild,
        environment: Resolution,
    },
}

/// Product info of the direct dependencies of `idx`, by capability.
///
/// Only capabilities the node actually requires are included.
fn dependency_product_infos(
    graph: &PackageGraph,
    idx: NodeIndex,
    infos: &HashMap<NodeIndex, ProductInfo>,
) -> DependencyProductInfos {
    let node = graph.node(idx);
    let mut result = DependencyProductInfos::new();
    for dependency in graph.dependencies(idx) {
        let provider = graph.node(dependency);
        let Some(info) = infos.get(&dependency) else {
            continue;
        };
        for interface in provider.detail.interfaces.intersection(&node.detail.dependencies) {
            if let Some(value) = info.get(interface) {
                result
                    .entry(interface.clone())
                    .or_default()
                    .insert(provider.package.clone(), value.clone());
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installer::DirectoryInstaller;
    use crate::models::{PackageDetail, ProductDetail, Requirement};
    use crate::repository::RepositoryCaches;
    use crate::test_utils::{MockDriver, archive_detail};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
        translators: Translators,
        installers: Installers,
        products: ProductCache,
        archives: ArchiveFetcher,
        containerizer: Containerizer,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let mut installers = Installers::default();
            installers.insert("simple", Arc::new(DirectoryInstaller::new()));
            Self {
                products: ProductCache::new(temp.path().join("products")),
                temp,
                translators: Translators::default(),
                installers,
                archives: ArchiveFetcher::new().unwrap(),
                containerizer: Containerizer::new(ContainerizerConfig::default()),
            }
        }

        fn engine<'a>(&'a self, repositories: &'a [Repository]) -> FetchEngine<'a> {
            FetchEngine::new(
                repositories,
                &self.translators,
                &self.installers,
                &self.products,
                &self.archives,
                &self.containerizer,
                &serde_json::Value::Null,
            )
        }

        /// A directory product holding `{name}.txt`.
        fn product(&self, name: &str) -> String {
            let dir = self.temp.path().join("sources").join(name);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join(format!("{name}.txt")), name).unwrap();
            dir.display().to_string()
        }

        fn chain(&self) -> MockDriver {
            let mut driver = MockDriver::new();
            for (name, deps) in [("p1", &[][..]), ("p2", &["p1"][..]), ("p3", &["p2"][..])] {
                let location = self.product(name);
                driver = driver
                    .with_package(name, archive_detail(name, deps, &location, "simple"))
                    .with_product_info(name, [(name.to_string(), json!({"version": "1.0"}))].into());
            }
            driver
        }

        async fn repository(&self, driver: Arc<MockDriver>) -> Repository {
            Repository::create("mock", driver, RepositoryCaches::in_dir(&self.temp.path().join("cache")))
                .await
                .unwrap()
        }
    }

    async fn chain_graph(repositories: &[Repository]) -> PackageGraph {
        let model = ["p1", "p2", "p3"].into_iter().map(String::from).collect();
        PackageGraph::build(repositories, &[], &model).await.unwrap()
    }

    #[tokio::test]
    async fn test_installs_chain_in_dependency_order() {
        let fixture = Fixture::new();
        let driver = Arc::new(fixture.chain());
        let repositories = vec![fixture.repository(driver.clone()).await];
        let graph = chain_graph(&repositories).await;

        let root = fixture.temp.path().join("root");
        let products =
            fixture.engine(&repositories).fetch_and_install(&graph, &[], &root).await.unwrap();

        let packages: Vec<_> = products.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(packages, ["p1", "p2", "p3"]);
        for name in ["p1", "p2", "p3"] {
            assert_eq!(std::fs::read_to_string(root.join(format!("{name}.txt"))).unwrap(), name);
        }
        assert_eq!(
            driver.events(),
            ["get_build_context:p1", "get_build_context:p2", "get_build_context:p3"]
        );
    }

    #[tokio::test]
    async fn test_second_run_hits_the_cache() {
        let fixture = Fixture::new();
        let driver = Arc::new(fixture.chain());
        let repositories = vec![fixture.repository(driver.clone()).await];
        let graph = chain_graph(&repositories).await;
        let engine = fixture.engine(&repositories);

        let first = engine.fetch_and_install(&graph, &[], &fixture.temp.path().join("a")).await.unwrap();
        let second = engine.fetch_and_install(&graph, &[], &fixture.temp.path().join("b")).await.unwrap();

        assert_eq!(first, second);
        // Build contexts are read on every run; products are not fetched again.
        assert_eq!(driver.calls("get_build_context"), 6);
        assert_eq!(driver.calls("compute_product_info"), 6);
        assert!(fixture.temp.path().join("b/p3.txt").exists());
    }

    #[tokio::test]
    async fn test_dependency_change_invalidates_dependents() {
        let fixture = Fixture::new();
        let driver = Arc::new(fixture.chain());
        let repositories = vec![fixture.repository(driver).await];
        let graph = chain_graph(&repositories).await;
        let first = fixture.engine(&repositories).fetch_and_install(&graph, &[], &fixture.temp.path().join("a")).await.unwrap();

        let changed = Arc::new(
            fixture.chain().with_product_info("p1", [("p1".to_string(), json!({"version": "2.0"}))].into()),
        );
        let repositories = vec![fixture.repository(changed.clone()).await];
        let second = fixture.engine(&repositories).fetch_and_install(&graph, &[], &fixture.temp.path().join("b")).await.unwrap();

        // p1 changed, and p2 and p3 embed it; everything is rebuilt.
        assert_eq!(changed.calls("get_build_context"), 3);
        for ((_, a), (_, b)) in first.iter().zip(&second) {
            assert_ne!(a.path, b.path);
        }
    }

    #[tokio::test]
    async fn test_dependency_product_infos_only_cover_required_capabilities() {
        let detail = |interfaces: &[&str], dependencies: &[&str]| PackageDetail {
            interfaces: interfaces.iter().map(|s| s.to_string()).collect(),
            dependencies: dependencies.iter().map(|s| s.to_string()).collect(),
            ..archive_detail("x", &[], "x", "simple")
        };
        let nodes = vec![
            GraphNode {
                package: "lib".to_string(),
                repository: 0,
                detail: detail(&["libfoo", "libfoo-dev"], &[]),
            },
            GraphNode {
                package: "app".to_string(),
                repository: 0,
                detail: detail(&["app"], &["libfoo"]),
            },
        ];
        let graph = PackageGraph::from_nodes(nodes, Vec::new()).unwrap();
        let lib = graph.find("lib").unwrap();
        let app = graph.find("app").unwrap();

        let mut infos = HashMap::new();
        infos.insert(
            lib,
            ProductInfo::from([
                ("libfoo".to_string(), json!({"version": "1"})),
                ("libfoo-dev".to_string(), json!({"headers": true})),
            ]),
        );

        let result = dependency_product_infos(&graph, app, &infos);
        assert_eq!(result.len(), 1);
        assert_eq!(result["libfoo"]["lib"], json!({"version": "1"}));
        assert!(dependency_product_infos(&graph, lib, &infos).is_empty());
    }

    #[tokio::test]
    async fn test_failure_leaves_destination_untouched() {
        let fixture = Fixture::new();
        let driver = Arc::new(fixture.chain().with_build_context(
            "p3",
            BuildContextDetail::Archive {
                location: fixture.temp.path().join("missing").display().to_string(),
                installer: "simple".to_string(),
            },
        ));
        let repositories = vec![fixture.repository(driver).await];
        let graph = chain_graph(&repositories).await;

        let root = fixture.temp.path().join("root");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("existing.txt"), "keep").unwrap();

        let error = fixture.engine(&repositories).fetch_and_install(&graph, &[], &root).await.unwrap_err();
        assert!(format!("{error:#}").contains("p3"));

        let entries: Vec<_> = std::fs::read_dir(&root).unwrap().map(|e| e.unwrap().file_name()).collect();
        assert_eq!(entries, ["existing.txt"]);

        // p1 and p2 were committed before the failure and stay cached.
        assert_eq!(fixture.products.root().join("entries").read_dir().unwrap().count(), 2);
    }

    #[test]
    fn test_nested_engine_rejects_build_cycles() {
        let fixture = Fixture::new();
        let engine = fixture.engine(&[]);
        let nested = engine.nested("a", "key-a").unwrap().nested("b", "key-b").unwrap();
        let error = nested.nested("a", "key-a2").err().unwrap();
        let Some(PpError::CircularDependency {
            chain,
        }) = error.downcast_ref::<PpError>()
        else {
            panic!("expected circular dependency, got {error:#}");
        };
        assert_eq!(chain, "a -> b -> a");
    }

    #[tokio::test]
    async fn test_builds_needing_each_other_fail_instead_of_waiting() {
        let fixture = Fixture::new();
        let meta = |name: &str, needs: &str| PackageDetail {
            interfaces: [name.to_string()].into(),
            dependencies: Default::default(),
            product: ProductDetail::Meta {
                requirements: vec![Requirement::noop(needs)],
                command: vec!["true".to_string()],
                on_top: false,
            },
        };
        let driver = Arc::new(MockDriver::new().with_package("a", meta("a", "b")).with_package("b", meta("b", "a")));
        let repositories = vec![fixture.repository(driver).await];
        let model = ["a", "b"].into_iter().map(String::from).collect();
        let graph = PackageGraph::build(&repositories, &[], &model).await.unwrap();

        let engine = fixture.engine(&repositories);
        let root = fixture.temp.path().join("root");
        let fetch = engine.fetch_and_install(&graph, &[], &root);
        let error = tokio::time::timeout(std::time::Duration::from_secs(10), fetch)
            .await
            .expect("builds waiting on each other must not hang")
            .unwrap_err();
        assert!(
            matches!(error.downcast_ref::<PpError>(), Some(PpError::CircularDependency { .. })),
            "expected circular dependency, got {error:#}"
        );
    }
}
