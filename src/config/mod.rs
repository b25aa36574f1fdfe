//! Configuration for pppackage
//!
//! One TOML file describes the package sources and plugins of an
//! installation. It is looked up, in order, at the `--config` flag, the
//! `PPPACKAGE_CONFIG` environment variable and `./pppackage.toml`. A missing
//! `./pppackage.toml` yields the default (empty) configuration; a missing
//! file that was named explicitly is an error.
//!
//! ```toml
//! data_path = "~/.cache/pppackage"
//!
//! [containerizer]
//! command = ["podman", "run", "--rm", "--rootfs", "{rootfs}"]
//!
//! [[repositories]]
//! kind = "local"
//! driver = "index"
//! parameters = { index = "repo/index.json" }
//!
//! [[repositories]]
//! kind = "remote"
//! url = "http://packages.example.com:8080"
//!
//! [translators.pacman]
//! kind = "versioned"
//!
//! [installers.simple]
//! kind = "directory"
//!
//! [generators.products]
//! kind = "products"
//! ```
//!
//! Relative paths (the data path and driver parameters such as `index`)
//! resolve against the directory containing the configuration file.
//!
//! # Data layout
//!
//! ```text
//! <data_path>/
//! ├── repositories/<index>/    translator data, formula and HTTP caches
//! └── products/                content-addressed product cache
//! ```

use crate::constants::DEFAULT_CONFIG_FILE;
use crate::core::PpError;
use crate::fetch::ContainerizerConfig;
use crate::generator::GeneratorConfig;
use crate::installer::InstallerConfig;
use crate::repository::registry::driver_names;
use crate::translator::TranslatorConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Where a repository's data comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RepositorySource {
    /// An in-process driver from the driver registry
    Local {
        /// Registered driver name
        driver: String,
        /// Driver parameters
        #[serde(default)]
        parameters: serde_json::Value,
    },
    /// A repository served over HTTP
    Remote {
        /// Base URL
        url: String,
    },
}

/// One configured repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Display name; defaults to the driver name or URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Data source
    #[serde(flatten)]
    pub source: RepositorySource,
}

impl RepositoryConfig {
    /// Name used in logs, errors and graph output.
    pub fn display_name(&self, index: usize) -> String {
        match (&self.name, &self.source) {
            (Some(name), _) => name.clone(),
            (
                None,
                RepositorySource::Local {
                    driver,
                    ..
                },
            ) => format!("{driver}#{index}"),
            (
                None,
                RepositorySource::Remote {
                    url,
                },
            ) => url.clone(),
        }
    }
}

/// The configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Cache root; `~` and environment variables are expanded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_path: Option<String>,

    /// Build sandbox
    #[serde(default)]
    pub containerizer: ContainerizerConfig,

    /// Repositories, in priority order
    #[serde(default)]
    pub repositories: Vec<RepositoryConfig>,

    /// Translators by name
    #[serde(default)]
    pub translators: BTreeMap<String, TranslatorConfig>,

    /// Installers by tag
    #[serde(default)]
    pub installers: BTreeMap<String, InstallerConfig>,

    /// Generators by name pattern
    #[serde(default)]
    pub generators: BTreeMap<String, GeneratorConfig>,

    /// Directory relative paths resolve against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Config {
    /// Loads the configuration from `path`, or from `./pppackage.toml`.
    ///
    /// # Errors
    ///
    /// Fails if an explicit `path` does not exist, if the file cannot be
    /// read or parsed, or if [`Config::validate`] rejects it.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(PpError::ConfigError {
                        message: format!("configuration file {} does not exist", path.display()),
                    }
                    .into());
                }
                Self::load_from(path).await?
            }
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::load_from(path).await?
                } else {
                    tracing::debug!(target: "config", "No {} found, using defaults", DEFAULT_CONFIG_FILE);
                    Self {
                        base_dir: std::env::current_dir().context("Failed to get current directory")?,
                        ..Self::default()
                    }
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Parses the configuration file at `path`.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let mut config: Self = toml::from_str(&content).map_err(|e| PpError::ConfigError {
            message: format!("failed to parse {}: {e}", path.display()),
        })?;

        let path = std::path::absolute(path)
            .with_context(|| format!("Failed to resolve config path {}", path.display()))?;
        config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

        tracing::debug!(
            target: "config",
            "Loaded {} with {} repositories",
            path.display(),
            config.repositories.len()
        );
        Ok(config)
    }

    /// Checks the parts of the configuration that can be checked without I/O.
    pub fn validate(&self) -> Result<()> {
        for (index, repository) in self.repositories.iter().enumerate() {
            match &repository.source {
                RepositorySource::Local {
                    driver,
                    ..
                } => {
                    if !driver_names().any(|name| name == driver) {
                        return Err(PpError::UnknownPlugin {
                            kind: "repository driver".to_string(),
                            name: driver.clone(),
                        }
                        .into());
                    }
                }
                RepositorySource::Remote {
                    url,
                } => {
                    reqwest::Url::parse(url).map_err(|e| PpError::ConfigError {
                        message: format!("repository #{index} has an invalid URL '{url}': {e}"),
                    })?;
                }
            }
        }

        if self.containerizer.command.iter().any(String::is_empty) {
            return Err(PpError::ConfigError {
                message: "containerizer command contains an empty argument".to_string(),
            }
            .into());
        }

        self.data_path()?;
        Ok(())
    }

    /// The expanded cache root.
    pub fn data_path(&self) -> Result<PathBuf> {
        match &self.data_path {
            Some(raw) => {
                let expanded = shellexpand::full(raw).map_err(|e| PpError::ConfigError {
                    message: format!("cannot expand data_path '{raw}': {e}"),
                })?;
                let path = PathBuf::from(expanded.as_ref());
                Ok(if path.is_absolute() {
                    path
                } else {
                    self.base_dir.join(path)
                })
            }
            None => dirs::data_dir().map(|dir| dir.join("pppackage")).ok_or_else(|| {
                PpError::ConfigError {
                    message: "no data directory on this platform; set data_path".to_string(),
                }
                .into()
            }),
        }
    }

    /// Cache directory of the repository at `index`.
    pub fn repository_cache_dir(&self, index: usize) -> Result<PathBuf> {
        Ok(self.data_path()?.join("repositories").join(index.to_string()))
    }

    /// Root of the product cache.
    pub fn products_dir(&self) -> Result<PathBuf> {
        Ok(self.data_path()?.join("products"))
    }
}
