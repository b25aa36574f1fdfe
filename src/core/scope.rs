//! Structured fan-out with fail-fast cancellation.
//!
//! [`scoped`] drives a set of futures concurrently inside the caller's task.
//! The first failure ends the scope: results that are already available are
//! collected so concurrent failures are reported together, and every child
//! still in flight is dropped (cancelled). Child processes spawned with
//! `kill_on_drop` are terminated as part of that drop.

use super::error::PpError;
use anyhow::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::future::Future;

/// Runs `futures` concurrently and returns their outputs in input order.
///
/// # Errors
///
/// A single failure is returned unchanged so callers can still downcast it.
/// Several failures observed at the same join point are returned as
/// [`PpError::Aggregate`].
pub async fn scoped<I, F, T>(futures: I) -> Result<Vec<T>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T>>,
{
    let mut pending: FuturesUnordered<_> = futures
        .into_iter()
        .enumerate()
        .map(|(index, future)| future.map(move |result| (index, result)))
        .collect();

    let mut outputs: Vec<(usize, T)> = Vec::with_capacity(pending.len());
    let mut errors = Vec::new();

    while let Some((index, result)) = pending.next().await {
        match result {
            Ok(value) => outputs.push((index, value)),
            Err(error) => {
                errors.push(error);
                // Collect siblings that already finished; the rest are cancelled on drop.
                while let Some(Some((_, result))) = pending.next().now_or_never() {
                    if let Err(error) = result {
                        errors.push(error);
                    }
                }
                break;
            }
        }
    }
    drop(pending);

    match errors.len() {
        0 => {
            outputs.sort_by_key(|(index, _)| *index);
            Ok(outputs.into_iter().map(|(_, value)| value).collect())
        }
        1 => Err(errors.remove(0)),
        _ => Err(PpError::aggregate(&errors).into()),
    }
}
