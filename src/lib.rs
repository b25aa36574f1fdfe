//! pppackage - a meta package manager core
//!
//! pppackage installs software from several package ecosystems at once. Every
//! configured repository publishes its packages as boolean variables plus a
//! formula relating them; one requirement is resolved across all of them by a
//! SAT solver, and the selected packages are fetched (or built) and installed
//! into a single destination directory.
//!
//! # Architecture Overview
//!
//! ```text
//!            requirement + options
//!                     │
//!   ┌─────────────────▼─────────────────┐
//!   │ resolver    translators + SAT      │◄── repositories (formula, translator data)
//!   └─────────────────┬─────────────────┘
//!                     │ model (set of package variables)
//!   ┌─────────────────▼─────────────────┐
//!   │ graph       capability edges, DAG  │◄── repositories (package detail)
//!   └─────────────────┬─────────────────┘
//!                     │ generations, dependencies first
//!   ┌─────────────────▼─────────────────┐
//!   │ fetch ══ install (concurrent)      │◄── product cache, build contexts
//!   └─────────────────┬─────────────────┘
//!                     │ products
//!   ┌─────────────────▼─────────────────┐
//!   │ generator   auxiliary artifacts    │
//!   └───────────────────────────────────┘
//! ```
//!
//! # Core Modules
//!
//! ## Pipeline
//! - [`resolver`] - CNF encoding of requirements and deterministic SAT solving
//! - [`graph`] - Dependency graph of a model, cycle detection and generations
//! - [`fetch`] - Content-addressed product fetching, archive downloads and meta builds
//! - [`installer`] - Installer plugins and the generation-ordered install pass
//! - [`generator`] - Post-install generators
//!
//! ## Sources and Plugins
//! - [`repository`] - Repository contract, epoch-checked caching, local and remote repositories
//! - [`translator`] - Requirement translators (`noop`, `versioned`)
//!
//! ## Supporting Modules
//! - [`cache`] - Versioned on-disk cache and the product cache
//! - [`cli`] - Command-line interface
//! - [`config`] - TOML configuration
//! - [`core`] - Error taxonomy and structured concurrency
//! - [`models`] - Requirements, package details and other shared data
//! - [`session`] - Per-invocation wiring of all of the above
//! - [`utils`] - File system helpers, hashing and progress bars
//!
//! # Configuration (pppackage.toml)
//!
//! ```toml
//! [[repositories]]
//! kind = "local"
//! driver = "index"
//! parameters = { index = "repo/index.json" }
//!
//! [installers.simple]
//! kind = "directory"
//! ```
//!
//! # Command-Line Usage
//!
//! ```bash
//! echo '{"requirements": {"translator": "noop", "value": "p3"}}' | pppackage install ./root
//! pppackage update
//! ```

// Core functionality
pub mod cache;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod models;
pub mod session;

// Sources and plugins
pub mod repository;
pub mod translator;

// Pipeline
pub mod fetch;
pub mod generator;
pub mod graph;
pub mod installer;
pub mod resolver;

// Supporting modules
pub mod utils;

// Test utilities (only compiled in test mode or with test-utils feature)
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
