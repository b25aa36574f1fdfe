//! pppackage CLI entry point
//!
//! Parses arguments, runs the command and turns errors into a colored report
//! on stderr. The exit code is 2 when no model satisfies the requirements
//! and 1 for every other failure.

use clap::Parser;
use pppackage::cli;
use pppackage::core::{exit_code, user_friendly_error};

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    if let Err(e) = cli.execute().await {
        let code = exit_code(&e);
        user_friendly_error(e).display();
        std::process::exit(code);
    }
}
