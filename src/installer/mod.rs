//! Product installation
//!
//! Products are installed by *installers*, chosen by the tag a product was
//! committed with. Tags are configured names that map to a built-in kind:
//!
//! ```toml
//! [installers.simple]
//! kind = "directory"
//!
//! [installers.zip]
//! kind = "zip"
//! ```
//!
//! The install pass walks the dependency graph generation by generation
//! (dependencies first, nodes of one generation concurrently). Each node
//! waits only for its own product; fetching of later nodes continues while
//! earlier ones install.

pub mod directory;
pub mod zip_archive;

pub use directory::DirectoryInstaller;
pub use zip_archive::ZipInstaller;

use crate::cache::CachedProduct;
use crate::core::{PpError, scoped};
use crate::graph::PackageGraph;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::oneshot;

/// The installer plugin contract.
pub trait Installer: Send + Sync {
    /// Installs the product at `product` into `root`.
    fn install<'a>(&'a self, product: &'a Path, root: &'a Path) -> BoxFuture<'a, Result<()>>;
}

/// Configured installer: registry kind plus parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstallerConfig {
    /// Registry kind
    pub kind: String,
    /// Kind-specific parameters
    #[serde(default)]
    pub parameters: serde_json::Value,
}

type InstallerFactory = fn(&str, &serde_json::Value) -> Result<Arc<dyn Installer>>;

const INSTALLERS: &[(&str, InstallerFactory)] =
    &[("directory", directory_factory), ("zip", zip_factory)];

fn directory_factory(tag: &str, parameters: &serde_json::Value) -> Result<Arc<dyn Installer>> {
    Ok(Arc::new(DirectoryInstaller::from_parameters(tag, parameters)?))
}

fn zip_factory(_tag: &str, _parameters: &serde_json::Value) -> Result<Arc<dyn Installer>> {
    Ok(Arc::new(ZipInstaller))
}

/// All installers of one invocation, by tag.
#[derive(Clone, Default)]
pub struct Installers {
    installers: BTreeMap<String, Arc<dyn Installer>>,
}

impl Installers {
    /// Instantiates every configured installer.
    pub fn from_config(configs: &BTreeMap<String, InstallerConfig>) -> Result<Self> {
        let mut installers = BTreeMap::new();
        for (tag, config) in configs {
            let factory = INSTALLERS
                .iter()
                .find(|(kind, _)| *kind == config.kind)
                .map(|(_, factory)| *factory)
                .ok_or_else(|| PpError::UnknownPlugin {
                    kind: "installer".to_string(),
                    name: config.kind.clone(),
                })?;
            installers.insert(tag.clone(), factory(tag, &config.parameters)?);
        }
        Ok(Self {
            installers,
        })
    }

    /// Adds `installer` under `tag`.
    pub fn insert(&mut self, tag: impl Into<String>, installer: Arc<dyn Installer>) {
        self.installers.insert(tag.into(), installer);
    }

    /// The installer for `tag`.
    ///
    /// # Errors
    ///
    /// [`PpError::ConfigError`] if no installer is configured under `tag`.
    pub fn get(&self, tag: &str) -> Result<&Arc<dyn Installer>> {
        self.installers.get(tag).ok_or_else(|| {
            PpError::ConfigError {
                message: format!("no installer configured for tag '{tag}'"),
            }
            .into()
        })
    }
}

/// Receivers of fetched products, one per graph node.
pub type ProductReceivers = HashMap<NodeIndex, oneshot::Receiver<CachedProduct>>;

/// Installs the products of a graph into a root.
pub struct InstallEngine<'a> {
    installers: &'a Installers,
}

impl<'a> InstallEngine<'a> {
    /// An engine using `installers`.
    pub fn new(installers: &'a Installers) -> Self {
        Self {
            installers,
        }
    }

    /// Installs every node of `graph` into `root` as its product arrives.
    ///
    /// # Errors
    ///
    /// Fails if a product never arrives (the fetch pass aborted), if its tag
    /// has no installer, or if installation fails.
    pub async fn install_pass(
        &self,
        graph: &PackageGraph,
        root: &Path,
        mut receivers: ProductReceivers,
    ) -> Result<()> {
        for generation in graph.generations() {
            let installs = generation.into_iter().map(|idx| {
                let receiver = receivers.remove(&idx);
                async move {
                    let package = &graph.node(idx).package;
                    let receiver = receiver.ok_or_else(|| PpError::InvariantViolation {
                        message: format!("no product channel for '{package}'"),
                    })?;
                    let product = receiver.await.map_err(|_| PpError::BuildFailed {
                        package: package.clone(),
                        reason: "fetch was aborted before the product was ready".to_string(),
                    })?;
                    self.install_one(package, &product, root).await
                }
            });
            scoped(installs).await?;
        }
        Ok(())
    }

    async fn install_one(&self, package: &str, product: &CachedProduct, root: &Path) -> Result<()> {
        tracing::debug!(target: "installer", "Installing {} with '{}'", package, product.installer);
        self.installers
            .get(&product.installer)?
            .install(&product.path, root)
            .await
            .with_context(|| format!("Failed to install '{package}'"))?;
        tracing::info!(target: "installer", "Installed {}", package);
        Ok(())
    }
}
