//! Batch Runner: bounded-concurrency executor over disjoint batches.
//!
//! Outcomes arrive in completion order, not submission order. A failed batch
//! never cancels its siblings; the caller decides what to do with each
//! `Result`.

use std::future::Future;
use std::sync::Arc;

use futures::stream::{self, Stream, StreamExt};

/// One finished batch: its submission index, the batch itself and what the
/// worker returned for it.
#[derive(Debug)]
pub struct BatchOutcome<B, T, E> {
    pub index: usize,
    pub batch: Arc<B>,
    pub result: Result<T, E>,
}

/// Splits items into consecutive, disjoint groups of at most `size` items.
/// A size of 0 is treated as 1.
pub fn chunk_jobs<J>(items: Vec<J>, size: usize) -> Vec<Vec<J>> {
    let size = size.max(1);
    let mut batches = Vec::with_capacity(items.len().div_ceil(size));
    let mut current = Vec::with_capacity(size.min(items.len()));
    for item in items {
        current.push(item);
        if current.len() == size {
            batches.push(std::mem::replace(&mut current, Vec::with_capacity(size)));
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// Runs `worker` over every batch with at most `limit` invocations in flight
/// and yields each outcome as soon as it completes. A limit of 0 is treated
/// as 1.
pub fn run_batches<B, T, E, F, Fut>(
    batches: Vec<B>,
    limit: usize,
    worker: F,
) -> impl Stream<Item = BatchOutcome<B, T, E>>
where
    F: Fn(Arc<B>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    stream::iter(batches.into_iter().enumerate())
        .map(move |(index, batch)| {
            let batch = Arc::new(batch);
            let call = worker(Arc::clone(&batch));
            async move {
                BatchOutcome {
                    index,
                    batch,
                    result: call.await,
                }
            }
        })
        .buffer_unordered(limit.max(1))
}
