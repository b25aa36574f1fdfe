//! `pppackage install`: the full resolve, fetch and install pipeline.
//!
//! The input document is JSON (see [`Input`]) read from `--input` or stdin:
//!
//! ```json
//! {
//!   "requirements": {"and": [{"translator": "pacman", "value": "bash>=5"}]},
//!   "options": {"arch": "x86_64"},
//!   "generators": ["products"]
//! }
//! ```

use super::CliConfig;
use crate::config::Config;
use crate::core::PpError;
use crate::models::Input;
use crate::session::Session;
use crate::utils::fs::atomic_write_async;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

/// Arguments of `pppackage install`.
#[derive(Args, Debug)]
pub struct InstallCommand {
    /// Directory to install into; replaced atomically on success
    destination: PathBuf,

    /// Input document; read from stdin when omitted
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Write the dependency graph as Graphviz DOT to this file
    #[arg(long)]
    graph: Option<PathBuf>,

    /// Directory generator output is written to
    #[arg(long)]
    generators_dir: Option<PathBuf>,

    /// Print the resolved packages and stop
    #[arg(long)]
    resolve_only: bool,
}

impl InstallCommand {
    /// Runs the pipeline.
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let input = read_input(self.input.as_deref()).await?;
        if !input.generators.is_empty() && self.generators_dir.is_none() && !self.resolve_only {
            return Err(PpError::ConfigError {
                message: "the input requests generators but no --generators-dir was given".to_string(),
            }
            .into());
        }

        let config = Config::load(cli.config_path.as_deref()).await?;
        let session = Session::from_config(&config).await?;

        let resolution = session.resolve(&input.requirement, &input.options).await?;
        if self.resolve_only {
            for package in &resolution.model {
                println!("{package}");
            }
            return Ok(());
        }

        let graph = session.build_graph(&resolution).await?;
        if let Some(path) = &self.graph {
            atomic_write_async(path, graph.to_dot().into_bytes()).await?;
            tracing::info!("Wrote dependency graph to {}", path.display());
        }

        let products =
            session.fetch_and_install(&graph, &resolution, input.build_options(), &self.destination).await?;

        if let Some(dir) = &self.generators_dir {
            session.generate(&input.generators, &products, dir).await?;
        }

        if !cli.quiet {
            println!(
                "{} Installed {} packages into {}",
                "✓".green().bold(),
                products.len(),
                self.destination.display()
            );
        }
        Ok(())
    }
}

async fn read_input(path: Option<&Path>) -> Result<Input> {
    let (source, content) = match path {
        Some(path) => {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read input from {}", path.display()))?;
            (path.display().to_string(), content)
        }
        None => {
            let mut content = String::new();
            tokio::io::stdin().read_to_string(&mut content).await.context("Failed to read input from stdin")?;
            ("stdin".to_string(), content)
        }
    };

    serde_json::from_str(&content).map_err(|e| {
        PpError::ConfigError {
            message: format!("invalid input document ({source}): {e}"),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Requirement;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_read_input_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("input.json");
        std::fs::write(
            &path,
            r#"{"requirements": {"translator": "noop", "value": "p3"}, "generators": ["products"]}"#,
        )
        .unwrap();

        let input = read_input(Some(&path)).await.unwrap();
        assert_eq!(input.requirement, Requirement::noop("p3"));
        assert_eq!(input.generators, ["products"]);
        assert!(input.options.is_null());
    }

    #[tokio::test]
    async fn test_malformed_input() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("input.json");
        std::fs::write(&path, r#"{"requirements": 3}"#).unwrap();

        let error = read_input(Some(&path)).await.unwrap_err();
        assert!(matches!(error.downcast_ref::<PpError>(), Some(PpError::ConfigError { .. })));
    }
}
