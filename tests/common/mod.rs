//! Shared helpers for the integration tests.
//!
//! [`TestProject`] owns a temporary directory laid out as:
//!
//! ```text
//! <temp>/
//! ├── project/            working directory of every command
//! │   ├── pppackage.toml
//! │   └── repo/           index repository with its products
//! └── data/               data_path (repository and product caches)
//! ```

#![allow(dead_code)]

use anyhow::{Context, Result};
use pppackage::test_utils::write_chain_index;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

/// Configuration using the index repository at `repo/index.json`.
pub const CHAIN_CONFIG: &str = r#"
[[repositories]]
name = "chain"
kind = "local"
driver = "index"
parameters = { index = "repo/index.json" }

[installers.simple]
kind = "directory"

[generators.products]
kind = "products"
"#;

/// Input document requiring `p3`.
pub const P3_INPUT: &str = r#"{"requirements": {"translator": "noop", "value": "p3"}}"#;

/// Test project builder for creating test environments
pub struct TestProject {
    _temp_dir: TempDir,
    project_dir: PathBuf,
    data_dir: PathBuf,
}

impl TestProject {
    /// Create a new test project with default structure
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let project_dir = temp_dir.path().join("project");
        let data_dir = temp_dir.path().join("data");
        fs::create_dir_all(&project_dir)?;

        Ok(Self {
            _temp_dir: temp_dir,
            project_dir,
            data_dir,
        })
    }

    /// A project with the `p1 <- p2 <- p3` index repository and [`CHAIN_CONFIG`].
    pub fn with_chain() -> Result<Self> {
        let project = Self::new()?;
        write_chain_index(&project.project_dir.join("repo"), "simple")?;
        project.write_config(CHAIN_CONFIG)?;
        Ok(project)
    }

    /// Get the project directory path
    pub fn project_path(&self) -> &Path {
        &self.project_dir
    }

    /// Get the data directory path
    pub fn data_path(&self) -> &Path {
        &self.data_dir
    }

    /// Number of committed product cache entries.
    pub fn cached_products(&self) -> usize {
        fs::read_dir(self.data_dir.join("products").join("entries")).map(|d| d.count()).unwrap_or(0)
    }

    /// Writes `pppackage.toml`, pointing `data_path` at the project's data directory.
    pub fn write_config(&self, content: &str) -> Result<()> {
        let path = self.project_dir.join("pppackage.toml");
        let data = self.data_dir.display().to_string().replace('\\', "/");
        fs::write(&path, format!("data_path = '{data}'\n{content}"))
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    /// Writes a file below the project directory.
    pub fn write_file(&self, path: &str, content: &str) -> Result<PathBuf> {
        let full = self.project_dir.join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&full, content)?;
        Ok(full)
    }

    /// Writes an index repository to `repo/index.json`.
    pub fn write_index(&self, index: &serde_json::Value) -> Result<()> {
        self.write_file("repo/index.json", &serde_json::to_string_pretty(index)?)?;
        Ok(())
    }

    /// Run a pppackage command in the project directory, feeding `stdin`.
    pub fn run_pppackage(&self, args: &[&str], stdin: Option<&str>) -> Result<CommandOutput> {
        let binary = env!("CARGO_BIN_EXE_pppackage");
        let mut child = Command::new(binary)
            .args(args)
            .current_dir(&self.project_dir)
            .env_remove("PPPACKAGE_CONFIG")
            .env_remove("RUST_LOG")
            .env("PPPACKAGE_NO_PROGRESS", "1")
            .env("NO_COLOR", "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to run pppackage")?;

        if let Some(mut handle) = child.stdin.take() {
            handle.write_all(stdin.unwrap_or_default().as_bytes())?;
        }
        let output = child.wait_with_output()?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        })
    }

    /// `pppackage install <destination>` with `input` on stdin.
    pub fn install(&self, destination: &str, input: &str, extra: &[&str]) -> Result<CommandOutput> {
        let mut args = vec!["install", destination];
        args.extend_from_slice(extra);
        self.run_pppackage(&args, Some(input))
    }
}

/// Command output helper
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub code: Option<i32>,
}

impl CommandOutput {
    /// Assert the command succeeded
    pub fn assert_success(&self) -> &Self {
        assert!(self.success, "Command failed with code {:?}\nStderr: {}", self.code, self.stderr);
        self
    }

    /// Assert the command exited with `code`
    pub fn assert_code(&self, code: i32) -> &Self {
        assert_eq!(self.code, Some(code), "Unexpected exit code\nStderr: {}", self.stderr);
        self
    }

    /// Assert stdout contains the given text
    pub fn assert_stdout_contains(&self, text: &str) -> &Self {
        assert!(
            self.stdout.contains(text),
            "Expected stdout to contain '{}'\nActual stdout: {}",
            text,
            self.stdout
        );
        self
    }

    /// Assert stderr contains the given text
    pub fn assert_stderr_contains(&self, text: &str) -> &Self {
        assert!(
            self.stderr.contains(text),
            "Expected stderr to contain '{}'\nActual stderr: {}",
            text,
            self.stderr
        );
        self
    }
}

/// File assertion helpers
pub struct FileAssert;

impl FileAssert {
    /// Assert a file exists
    pub fn exists(path: impl AsRef<Path>) {
        let path = path.as_ref();
        assert!(path.exists(), "Expected file to exist: {}", path.display());
    }

    /// Assert a file does not exist
    pub fn not_exists(path: impl AsRef<Path>) {
        let path = path.as_ref();
        assert!(!path.exists(), "Expected file to not exist: {}", path.display());
    }

    /// Assert a file has exactly `expected` as content
    pub fn content(path: impl AsRef<Path>, expected: &str) {
        let path = path.as_ref();
        let actual = fs::read_to_string(path)
            .unwrap_or_else(|e| panic!("Failed to read {}: {e}", path.display()));
        assert_eq!(actual, expected, "Unexpected content in {}", path.display());
    }
}
