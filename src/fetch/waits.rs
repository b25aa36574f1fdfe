//! Wait tracking for product leases held across meta builds.
//!
//! A meta build keeps the lease of its own product while it fetches the
//! products of its build environment. If that environment needs a product
//! whose lease is held by a build that is (directly or through its own
//! environment) waiting for us, neither side can make progress. Every nested
//! fetch registers what it is about to wait for, and a request that would
//! close a cycle fails with [`PpError::CircularDependency`] instead of
//! blocking.

use crate::core::PpError;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// A meta build in progress: the package and the cache key it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Build {
    /// Package being built
    pub package: String,
    /// Product cache key whose lease the build holds
    pub key: String,
}

/// Registry of the leases that running builds wait for.
///
/// Keyed by the cache key a build holds. The values are the `(key, package)`
/// pairs its environment is currently waiting to lease.
#[derive(Debug, Default)]
pub struct LeaseWaits {
    waits: Mutex<HashMap<String, Vec<(String, String)>>>,
}

/// Registration of one pending lease; removed again on drop.
#[derive(Debug)]
pub struct PendingLease<'a> {
    waits: &'a LeaseWaits,
    holders: Vec<String>,
    key: String,
}

impl LeaseWaits {
    /// Records that the builds in `chain` (outermost first) are about to
    /// wait for the lease of `key`, which belongs to `package`.
    ///
    /// # Errors
    ///
    /// [`PpError::CircularDependency`] if `key` is held by one of the builds
    /// in `chain`, or by a build that already waits for one of them.
    pub fn register<'a>(&'a self, chain: &[Build], key: &str, package: &str) -> Result<PendingLease<'a>> {
        let mut waits = self.waits.lock().unwrap_or_else(PoisonError::into_inner);

        // Breadth-first over "holder of k waits for" edges, remembering the
        // packages on the way for the error message.
        let mut queue = vec![(key.to_string(), vec![package.to_string()])];
        let mut seen = Vec::new();
        while let Some((current, path)) = queue.pop() {
            if let Some(position) = chain.iter().position(|build| build.key == current) {
                let mut cycle: Vec<String> = chain[position..].iter().map(|b| b.package.clone()).collect();
                cycle.extend(path);
                return Err(PpError::CircularDependency {
                    chain: cycle.join(" -> "),
                }
                .into());
            }
            if seen.contains(&current) {
                continue;
            }
            for (next, next_package) in waits.get(&current).into_iter().flatten() {
                let mut next_path = path.clone();
                next_path.push(next_package.clone());
                queue.push((next.clone(), next_path));
            }
            seen.push(current);
        }

        let holders: Vec<String> = chain.iter().map(|build| build.key.clone()).collect();
        for holder in &holders {
            waits.entry(holder.clone()).or_default().push((key.to_string(), package.to_string()));
        }

        Ok(PendingLease {
            waits: self,
            holders,
            key: key.to_string(),
        })
    }
}

impl Drop for PendingLease<'_> {
    fn drop(&mut self) {
        let mut waits = self.waits.waits.lock().unwrap_or_else(PoisonError::into_inner);
        for holder in &self.holders {
            if let Some(pending) = waits.get_mut(holder) {
                if let Some(index) = pending.iter().position(|(key, _)| *key == self.key) {
                    pending.swap_remove(index);
                }
                if pending.is_empty() {
                    waits.remove(holder);
                }
            }
        }
    }
}
