//! Utility modules
//!
//! - [`fs`]: atomic writes, recursive copies and staged directory swaps
//! - [`progress`]: terminal progress indicators
//! - [`hash`]: content hashing for cache keys

pub mod fs;
pub mod hash;
pub mod progress;
