//! Meta builds: products built inside a sandboxed build root.
//!
//! A meta build resolves its own requirements (with the build options),
//! installs the resulting packages into a fresh build root and runs the build
//! command there through the [`Containerizer`](super::Containerizer). The
//! command must leave two files behind:
//!
//! ```text
//! <root>/mnt/output/product     the product (file or directory)
//! <root>/mnt/output/installer   the installer tag for the product
//! ```
//!
//! With `on_top`, the direct dependencies of the package being built are
//! added to the build requirements.
//!
//! The environment is resolved before the product is looked up in the cache:
//! the selected packages are part of the product's cache key.

use super::FetchEngine;
use crate::constants::{BUILD_OUTPUT_DIR, INSTALLER_FILE, PRODUCT_FILE};
use crate::core::PpError;
use crate::graph::PackageGraph;
use crate::models::Requirement;
use crate::resolver::{Resolution, Resolver};
use crate::utils::fs::copy_path_async;
use anyhow::{Context, Result};
use futures::future::LocalBoxFuture;
use petgraph::graph::NodeIndex;
use std::path::Path;

/// Build instructions from a meta build context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaBuild {
    /// Requirements of the build environment
    pub requirements: Vec<Requirement>,
    /// Command run in the build root
    pub command: Vec<String>,
    /// Add the package's direct dependencies to the environment
    pub on_top: bool,
}

impl MetaBuild {
    /// The requirement the build environment is resolved from.
    pub fn environment(&self, graph: &PackageGraph, idx: NodeIndex) -> Requirement {
        let mut requirements = self.requirements.clone();
        if self.on_top {
            requirements.extend(graph.dependencies(idx).into_iter().map(|dep| Requirement::noop(&graph.node(dep).package)));
        }
        Requirement::all(requirements)
    }
}

/// Resolves the build environment of node `idx` with the build options.
///
/// # Errors
///
/// [`PpError::BuildFailed`] when no set of packages satisfies the build
/// requirements.
pub async fn resolve_environment(
    engine: &FetchEngine<'_>,
    graph: &PackageGraph,
    idx: NodeIndex,
    build: &MetaBuild,
) -> Result<Resolution> {
    let package = graph.node(idx).package.as_str();
    let requirement = build.environment(graph, idx);
    tracing::debug!(target: "fetch", "Resolving build environment of {}: {}", package, requirement);

    let resolved = Resolver::new(engine.repositories, engine.translators)
        .resolve(&requirement, engine.build_options)
        .await;
    resolved.map_err(|error| match error.downcast_ref::<PpError>() {
        Some(PpError::NoModel { .. }) => PpError::BuildFailed {
            package: package.to_string(),
            reason: format!("no build environment satisfies {requirement}"),
        }
        .into(),
        _ => error.context(format!("Failed to resolve build environment of '{package}'")),
    })
}

/// Builds the product of node `idx`, leased as `key`, into `destination` and
/// returns its installer tag.
///
/// Boxed because building the environment fetches products, which may
/// themselves be meta builds.
pub fn build<'a, 'b>(
    engine: &'b FetchEngine<'a>,
    graph: &'b PackageGraph,
    idx: NodeIndex,
    key: &'b str,
    build: MetaBuild,
    resolution: Resolution,
    destination: &'b Path,
) -> LocalBoxFuture<'b, Result<String>> {
    Box::pin(async move {
        let package = graph.node(idx).package.as_str();
        let engine = engine.nested(package, key)?;

        tracing::info!(target: "fetch", "Building {} on {} packages", package, resolution.model.len());

        let environment =
            PackageGraph::build(engine.repositories, &resolution.translated_options, &resolution.model).await?;

        let workdir = engine.containerizer.workdir();
        tokio::fs::create_dir_all(&workdir)
            .await
            .with_context(|| format!("Failed to create directory: {}", workdir.display()))?;
        let root = tempfile::Builder::new()
            .prefix("pppackage-build-")
            .tempdir_in(&workdir)
            .with_context(|| format!("Failed to create build root in {}", workdir.display()))?;

        engine.fetch_and_install_into(&environment, &resolution.translated_options, root.path()).await?;

        let output = root.path().join(BUILD_OUTPUT_DIR);
        tokio::fs::create_dir_all(&output)
            .await
            .with_context(|| format!("Failed to create directory: {}", output.display()))?;

        let run = engine
            .containerizer
            .run(root.path(), &build.command)
            .await
            .with_context(|| format!("Build of '{package}' failed"))?;
        tracing::debug!(target: "fetch", "{} build output:\n{}", package, run.stdout);

        collect_output(package, &output, destination).await
    })
}

/// Moves the product out of a finished build root.
async fn collect_output(package: &str, output: &Path, destination: &Path) -> Result<String> {
    let product = output.join(PRODUCT_FILE);
    let installer_file = output.join(INSTALLER_FILE);
    let failed = |reason: String| PpError::BuildFailed {
        package: package.to_string(),
        reason,
    };

    if !product.exists() {
        return Err(failed(format!("the build did not produce {BUILD_OUTPUT_DIR}/{PRODUCT_FILE}")).into());
    }
    let installer = match tokio::fs::read_to_string(&installer_file).await {
        Ok(tag) => tag.trim().to_string(),
        Err(_) => {
            return Err(failed(format!("the build did not produce {BUILD_OUTPUT_DIR}/{INSTALLER_FILE}")).into());
        }
    };
    if installer.is_empty() {
        return Err(failed(format!("{BUILD_OUTPUT_DIR}/{INSTALLER_FILE} is empty")).into());
    }

    copy_path_async(&product, destination).await?;
    Ok(installer)
}
