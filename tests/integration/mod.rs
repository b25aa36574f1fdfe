//! Integration test suite for pppackage
//!
//! End-to-end tests that run the `pppackage` binary against index
//! repositories written to temporary directories.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **cli**: Argument handling and error reporting
//! - **install**: The install pipeline, caching, graph output and generators
//! - **resolve**: Model selection, `--resolve-only` and unsatisfiable inputs
//! - **update**: Re-indexing local repositories

// Shared test utilities (from parent tests/ directory)
#[path = "../common/mod.rs"]
mod common;

mod cli;
mod install;
mod resolve;
mod update;
