//! `pppackage update`: re-index local repositories.

use super::CliConfig;
use crate::config::Config;
use crate::session::Session;
use anyhow::Result;
use clap::Args;
use colored::Colorize;

/// Arguments of `pppackage update`.
#[derive(Args, Debug)]
pub struct UpdateCommand {}

impl UpdateCommand {
    /// Updates every local repository concurrently.
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let config = Config::load(cli.config_path.as_deref()).await?;
        let session = Session::from_config(&config).await?;
        let updated = session.update().await?;

        if !cli.quiet {
            println!("{} Updated {} repositories", "✓".green().bold(), updated);
        }
        Ok(())
    }
}
