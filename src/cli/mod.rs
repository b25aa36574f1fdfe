//! Command-line interface for pppackage.
//!
//! # Commands
//!
//! - `install` - Resolve a requirement, then fetch, build and install the
//!   selected packages into a destination
//! - `update` - Re-index every local repository
//!
//! # Global Options
//!
//! - `--config` - Configuration file (also `PPPACKAGE_CONFIG`)
//! - `--verbose` / `--quiet` - Log level
//! - `--no-progress` - Hide progress bars
//!
//! # Examples
//!
//! ```bash
//! # Install into ./root, reading the input document from stdin
//! echo '{"requirements": {"translator": "noop", "value": "p3"}}' | pppackage install root
//!
//! # Only print the selected packages
//! pppackage install root --input input.json --resolve-only
//!
//! # Write the dependency graph and run generators
//! pppackage install root --input input.json --graph graph.dot --generators-dir out
//! ```

mod install;
mod update;

use crate::constants::CONFIG_ENV;
use crate::utils::progress::disable_progress;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Settings derived from the global flags.
///
/// Kept separate from [`Cli`] so commands can be driven without parsing
/// arguments.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Default log filter when `RUST_LOG` is unset; `None` disables logging
    pub log_level: Option<String>,

    /// Hide progress bars
    pub no_progress: bool,

    /// Configuration file; `None` falls back to `./pppackage.toml`
    pub config_path: Option<PathBuf>,

    /// Suppress the summary output of commands
    pub quiet: bool,
}

impl CliConfig {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the tracing subscriber and progress settings.
    ///
    /// `RUST_LOG` takes precedence over [`CliConfig::log_level`]. Calling
    /// this more than once keeps the first subscriber.
    pub fn apply(&self) {
        if self.no_progress {
            disable_progress();
        }

        let filter = match (EnvFilter::try_from_default_env(), &self.log_level) {
            (Ok(filter), _) => filter,
            (Err(_), Some(level)) => EnvFilter::new(format!("pppackage={level}")),
            (Err(_), None) => return,
        };
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }
}

/// Main CLI structure.
#[derive(Parser)]
#[command(
    name = "pppackage",
    about = "Meta package manager - resolve, build and install packages from many sources",
    version,
    long_about = "pppackage resolves one requirement across all configured repositories with a SAT \
                  solver, then fetches or builds every selected package and installs the products \
                  into a destination directory."
)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress logging, progress and summaries
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Disable progress bars
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve, fetch and install packages into a destination
    Install(install::InstallCommand),

    /// Re-index local repositories
    Update(update::UpdateCommand),
}

impl Cli {
    /// Executes the parsed command.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    /// Settings derived from the global flags.
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            None
        } else {
            Some("info".to_string())
        };

        CliConfig {
            log_level,
            no_progress: self.no_progress || self.quiet,
            config_path: self.config.clone(),
            quiet: self.quiet,
        }
    }

    /// Executes the command with explicit settings.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        config.apply();

        match self.command {
            Commands::Install(cmd) => cmd.execute(&config).await,
            Commands::Update(cmd) => cmd.execute(&config).await,
        }
    }
}
