//! Static registry of repository drivers.
//!
//! Drivers are looked up by the identifier used in the configuration
//! (`driver = "index"`). Each factory receives the driver parameters table
//! and the directory relative paths resolve against.

use super::RepositoryDriver;
use super::index::IndexDriver;
use crate::core::PpError;
use anyhow::Result;
use futures::future::BoxFuture;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything a driver factory gets.
#[derive(Debug, Clone)]
pub struct DriverContext {
    /// Driver parameters from the configuration
    pub parameters: serde_json::Value,
    /// Directory relative paths in `parameters` resolve against
    pub base_dir: PathBuf,
}

type DriverFactory = fn(DriverContext) -> BoxFuture<'static, Result<Arc<dyn RepositoryDriver>>>;

const DRIVERS: &[(&str, DriverFactory)] = &[("index", index_factory)];

#[derive(Deserialize)]
struct IndexParameters {
    index: PathBuf,
}

fn index_factory(context: DriverContext) -> BoxFuture<'static, Result<Arc<dyn RepositoryDriver>>> {
    Box::pin(async move {
        let parameters: IndexParameters =
            serde_json::from_value(context.parameters).map_err(|e| PpError::ConfigError {
                message: format!("invalid parameters for driver 'index': {e}"),
            })?;
        let path = context.base_dir.join(parameters.index);
        let driver: Arc<dyn RepositoryDriver> = Arc::new(IndexDriver::open(path).await?);
        Ok(driver)
    })
}

/// Names of all registered drivers.
pub fn driver_names() -> impl Iterator<Item = &'static str> {
    DRIVERS.iter().map(|(name, _)| *name)
}

/// Instantiates the driver registered as `name`.
///
/// # Errors
///
/// [`PpError::UnknownPlugin`] if no driver has that name; otherwise whatever
/// the driver's own construction reports.
pub async fn create_driver(name: &str, context: DriverContext) -> Result<Arc<dyn RepositoryDriver>> {
    let factory = DRIVERS
        .iter()
        .find(|(registered, _)| *registered == name)
        .map(|(_, factory)| *factory)
        .ok_or_else(|| PpError::UnknownPlugin {
            kind: "repository driver".to_string(),
            name: name.to_string(),
        })?;
    factory(context).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_unknown_driver() {
        let context = DriverContext {
            parameters: serde_json::Value::Null,
            base_dir: PathBuf::from("."),
        };
        let error = create_driver("pacman", context).await.err().unwrap();
        assert!(matches!(error.downcast_ref::<PpError>(), Some(PpError::UnknownPlugin { .. })));
        assert_eq!(driver_names().collect::<Vec<_>>(), vec!["index"]);
    }

    #[tokio::test]
    async fn test_index_driver_resolves_relative_path() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("repo.json"), "{}").unwrap();

        let context = DriverContext {
            parameters: serde_json::json!({"index": "repo.json"}),
            base_dir: temp.path().to_path_buf(),
        };
        let driver = create_driver("index", context).await.unwrap();
        assert!(!driver.get_epoch().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bad_parameters_are_config_errors() {
        let context = DriverContext {
            parameters: serde_json::json!({"path": "repo.json"}),
            base_dir: PathBuf::from("."),
        };
        let error = create_driver("index", context).await.err().unwrap();
        assert!(matches!(error.downcast_ref::<PpError>(), Some(PpError::ConfigError { .. })));
    }
}
