use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

/// Keeps lookups under the scanning service's secondary rate limits.
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Runs `worker` once per item with at most `max_concurrent` invocations in
/// flight, returning only after every invocation has finished.
///
/// Dispatch waits on a semaphore permit, so no item starts until capacity
/// frees. Results come back in completion order. A panicking invocation is
/// logged and contributes no result.
pub async fn run_bounded<T, R, F, Fut>(items: Vec<T>, max_concurrent: usize, worker: F) -> Vec<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    let limit = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let worker = Arc::new(worker);
    let total = items.len();
    let mut tasks = JoinSet::new();

    for item in items {
        let Ok(permit) = limit.clone().acquire_owned().await else {
            error!("concurrency gate closed; dispatching no further workers");
            break;
        };
        let worker = worker.clone();
        tasks.spawn(async move {
            let out = worker(item).await;
            drop(permit);
            out
        });
    }
    debug!(total, "dispatched all workers, waiting for completion");

    let mut results = Vec::with_capacity(total);
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(out) => results.push(out),
            Err(err) => error!("worker task did not complete: {err}"),
        }
    }
    results
}
