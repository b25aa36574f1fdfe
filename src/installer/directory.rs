//! Installs products by copying them into the root.
//!
//! A directory product is merged into the root, replacing files that
//! already exist. A single-file product is copied to `parameters.target`,
//! a path relative to the root:
//!
//! ```toml
//! [installers.config-file]
//! kind = "directory"
//! parameters = { target = "etc/app.conf" }
//! ```

use super::Installer;
use crate::core::PpError;
use crate::utils::fs::copy_path_async;
use anyhow::Result;
use futures::future::BoxFuture;
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
struct Parameters {
    target: Option<PathBuf>,
}

/// Copies directory products into the root, and file products to a fixed target.
#[derive(Debug, Clone, Default)]
pub struct DirectoryInstaller {
    target: Option<PathBuf>,
}

impl DirectoryInstaller {
    /// An installer that only accepts directory products.
    pub fn new() -> Self {
        Self::default()
    }

    /// An installer that copies file products to `target` below the root.
    pub fn with_target(target: impl Into<PathBuf>) -> Result<Self> {
        let target = target.into();
        let escapes = target
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || target.as_os_str().is_empty() {
            return Err(PpError::ConfigError {
                message: format!("installer target '{}' must be a relative path inside the root", target.display()),
            }
            .into());
        }
        Ok(Self {
            target: Some(target),
        })
    }

    /// Builds the installer configured under `tag`.
    pub fn from_parameters(tag: &str, parameters: &serde_json::Value) -> Result<Self> {
        let parameters: Parameters = if parameters.is_null() {
            Parameters::default()
        } else {
            serde_json::from_value(parameters.clone()).map_err(|e| PpError::ConfigError {
                message: format!("invalid parameters for installer '{tag}': {e}"),
            })?
        };
        match parameters.target {
            Some(target) => Self::with_target(target),
            None => Ok(Self::new()),
        }
    }
}

impl Installer for DirectoryInstaller {
    fn install<'a>(&'a self, product: &'a Path, root: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if product.is_dir() {
                return copy_path_async(product, root).await;
            }

            let target = self.target.as_ref().ok_or_else(|| PpError::ConfigError {
                message: format!(
                    "{} is a file; the installer needs a 'target' parameter to place it",
                    product.display()
                ),
            })?;
            copy_path_async(product, &root.join(target)).await
        })
    }
}
