//! Generators: auxiliary artifacts produced after installation.
//!
//! The input document requests generators by name. Configured generator
//! *patterns* decide which kind handles a name: a pattern is either an exact
//! name or a prefix ending in `*`. The most specific (longest) matching
//! pattern wins.
//!
//! ```toml
//! [generators."products"]
//! kind = "products"
//!
//! [generators."listing-*"]
//! kind = "products"
//! ```
//!
//! The built-in `products` kind writes `{output}/{name}.json` listing every
//! installed package with the path of its product.

use crate::core::{PpError, scoped};
use crate::utils::fs::atomic_write_async;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One installed product handed to generators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedProduct {
    /// Package variable
    pub package: String,
    /// Product path in the cache
    pub path: PathBuf,
    /// Installer tag
    pub installer: String,
}

/// The generator plugin contract.
pub trait Generator: Send + Sync {
    /// Produces the artifact of generator `name` below `output`.
    fn generate<'a>(
        &'a self,
        name: &'a str,
        products: &'a [GeneratedProduct],
        output: &'a Path,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Configured generator kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Registry kind
    pub kind: String,
}

/// Writes a JSON listing of the installed products.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProductsGenerator;

impl Generator for ProductsGenerator {
    fn generate<'a>(
        &'a self,
        name: &'a str,
        products: &'a [GeneratedProduct],
        output: &'a Path,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let path = output.join(format!("{name}.json"));
            let listing = serde_json::to_vec_pretty(products).context("Failed to serialize product listing")?;
            atomic_write_async(&path, listing).await
        })
    }
}

type GeneratorFactory = fn() -> Arc<dyn Generator>;

const GENERATORS: &[(&str, GeneratorFactory)] = &[("products", || Arc::new(ProductsGenerator))];

fn matches(pattern: &str, name: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => name.starts_with(prefix),
        None => pattern == name,
    }
}

/// Configured generators, by pattern.
#[derive(Clone, Default)]
pub struct Generators {
    generators: BTreeMap<String, Arc<dyn Generator>>,
}

impl Generators {
    /// Instantiates every configured generator.
    pub fn from_config(configs: &BTreeMap<String, GeneratorConfig>) -> Result<Self> {
        let mut generators = BTreeMap::new();
        for (pattern, config) in configs {
            let factory = GENERATORS
                .iter()
                .find(|(kind, _)| *kind == config.kind)
                .map(|(_, factory)| *factory)
                .ok_or_else(|| PpError::UnknownPlugin {
                    kind: "generator".to_string(),
                    name: config.kind.clone(),
                })?;
            generators.insert(pattern.clone(), factory());
        }
        Ok(Self {
            generators,
        })
    }

    /// Adds `generator` under `pattern`.
    pub fn insert(&mut self, pattern: impl Into<String>, generator: Arc<dyn Generator>) {
        self.generators.insert(pattern.into(), generator);
    }

    /// The generator handling `name`.
    ///
    /// # Errors
    ///
    /// [`PpError::ConfigError`] if no pattern matches.
    pub fn find(&self, name: &str) -> Result<&Arc<dyn Generator>> {
        self.generators
            .iter()
            .filter(|(pattern, _)| matches(pattern, name))
            .max_by_key(|(pattern, _)| (!pattern.ends_with('*'), pattern.len()))
            .map(|(_, generator)| generator)
            .ok_or_else(|| {
                PpError::ConfigError {
                    message: format!("no generator configured for '{name}'"),
                }
                .into()
            })
    }

    /// Runs the generators `names` concurrently.
    ///
    /// Every name is matched before any generator runs.
    pub async fn generate(&self, names: &[String], products: &[GeneratedProduct], output: &Path) -> Result<()> {
        let selected = names
            .iter()
            .map(|name| Ok((name.as_str(), self.find(name)?)))
            .collect::<Result<Vec<_>>>()?;
        if selected.is_empty() {
            return Ok(());
        }

        tokio::fs::create_dir_all(output)
            .await
            .with_context(|| format!("Failed to create directory: {}", output.display()))?;

        scoped(selected.into_iter().map(|(name, generator)| async move {
            generator
                .generate(name, products, output)
                .await
                .with_context(|| format!("Generator '{name}' failed"))?;
            tracing::info!(target: "generator", "Generated {}", name);
            Ok(())
        }))
        .await?;
        Ok(())
    }
}
