use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::Mutex;
use tracing::debug;

/// Identifies the (subscription, cloud_service, deployment) a job targets.
/// Jobs sharing a key execute strictly FIFO; jobs on distinct keys run with
/// unbounded parallelism, one lane per key.
pub type RouteKey = (String, String, String);

type LaneJob = BoxFuture<'static, ()>;

/// Per-deployment mutual exclusion for the job runner.
///
/// Each distinct [`RouteKey`] gets its own lane: an unbounded channel fed by
/// [`TaskRouter::route`] and drained by a single `tokio::spawn`ed consumer
/// that awaits one job to completion before starting the next. This is what
/// keeps at most one in-flight async operation targeting a given deployment
/// (the provider constraint from the data model) while never blocking work
/// on unrelated deployments.
#[derive(Clone, Default)]
pub struct TaskRouter {
    lanes: Arc<Mutex<HashMap<RouteKey, UnboundedSender<LaneJob>>>>,
}

impl TaskRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues `job` on the lane for `key`, spawning that lane's consumer
    /// the first time the key is seen.
    pub async fn route(&self, key: RouteKey, job: LaneJob) {
        let mut lanes = self.lanes.lock().await;
        let sender = lanes.entry(key.clone()).or_insert_with(|| {
            let (tx, mut rx) = mpsc::unbounded_channel::<LaneJob>();
            tokio::spawn(async move {
                while let Some(job) = rx.recv().await {
                    job.await;
                }
                debug!("task router lane drained");
            });
            tx
        });

        // A send error means the lane's consumer has already exited (it
        // never does while this sender is alive), so it is unreachable in
        // practice; dropping the job on that path is still safe since the
        // caller observes it through the job's own completion signal.
        let _ = sender.send(job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn same_key_jobs_run_in_order() {
        let router = TaskRouter::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let order = Arc::clone(&order);
            let key = ("sub".to_string(), "svc".to_string(), "dep".to_string());
            router
                .route(
                    key,
                    Box::pin(async move {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        order.lock().await.push(i);
                    }),
                )
                .await;
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*order.lock().await, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn distinct_keys_run_concurrently() {
        let router = TaskRouter::new();
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_concurrent = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = oneshot::channel::<()>();
        let rx = Arc::new(Mutex::new(Some(rx)));

        for i in 0..2 {
            let concurrent = Arc::clone(&concurrent);
            let max_concurrent = Arc::clone(&max_concurrent);
            let rx = Arc::clone(&rx);
            let key = (format!("sub{i}"), "svc".to_string(), "dep".to_string());
            router
                .route(
                    key,
                    Box::pin(async move {
                        let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                        max_concurrent.fetch_max(now, Ordering::SeqCst);
                        if let Some(rx) = rx.lock().await.take() {
                            let _ = rx.await;
                        }
                        concurrent.fetch_sub(1, Ordering::SeqCst);
                    }),
                )
                .await;
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = tx.send(());
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(max_concurrent.load(Ordering::SeqCst), 2);
    }
}
