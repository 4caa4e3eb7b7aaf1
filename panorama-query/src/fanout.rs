//! Bounded concurrent fan-out.
//!
//! Sub-fetches run as tasks in a `JoinSet` gated by a semaphore. Results come
//! back in input order whatever order the tasks finish in. Dropping the
//! returned future drops the `JoinSet`, which aborts every task still running,
//! so no sub-fetch outlives its request.

use panorama_core::{FetchError, PanoramaError, PanoramaResult};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Run `task(item)` for every item with at most `concurrency` in flight.
///
/// Per-item errors are returned in place. The first data-correctness error
/// (access or validation) aborts the whole fan-out instead, since every other
/// item would be wrong in the same way.
pub(crate) async fn run_bounded<I, R, F, Fut>(
    items: Vec<I>,
    concurrency: usize,
    task: F,
) -> PanoramaResult<Vec<PanoramaResult<R>>>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = PanoramaResult<R>> + Send + 'static,
    R: Send + 'static,
{
    let count = items.len();
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut set = JoinSet::new();

    for (index, item) in items.into_iter().enumerate() {
        let fut = task(item);
        let semaphore = Arc::clone(&semaphore);
        set.spawn(async move {
            // The semaphore is never closed.
            let _permit = semaphore.acquire_owned().await.ok();
            (index, fut.await)
        });
    }

    let mut slots: Vec<Option<PanoramaResult<R>>> = (0..count).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((_, Err(e))) if e.is_data_correctness() => return Err(e),
            Ok((index, result)) => slots[index] = Some(result),
            Err(e) => tracing::warn!(error = %e, "Fan-out task did not complete"),
        }
    }

    Ok(slots
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|| {
                Err(PanoramaError::from(FetchError::TaskFailed {
                    reason: "sub-fetch task panicked or was cancelled".to_string(),
                }))
            })
        })
        .collect())
}
