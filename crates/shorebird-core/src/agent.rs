//! Agent wiring: the worker group and the cache-event bridge.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::ObjectKey;
use crate::ports::BackupEvents;
use crate::queue::WorkQueue;
use crate::reconcile::Reconciler;

/// Feeds cache change notifications straight into the work queue.
/// Registered with the cache at startup; both event kinds enqueue.
pub struct EnqueueEvents {
    queue: Arc<WorkQueue>,
}

impl EnqueueEvents {
    pub fn new(queue: Arc<WorkQueue>) -> Self {
        Self { queue }
    }
}

impl BackupEvents for EnqueueEvents {
    fn on_add(&self, key: ObjectKey) {
        self.queue.enqueue(key);
    }

    fn on_update(&self, key: ObjectKey) {
        self.queue.enqueue(key);
    }
}

/// Handle to the running worker group.
///
/// Shutdown is cooperative: workers stop taking new keys, in-flight
/// reconciliations run to completion, then `shutdown_and_join` returns.
pub struct Agent {
    queue: Arc<WorkQueue>,
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl Agent {
    /// Spawns `workers` loops pulling from `queue` into `reconciler`.
    pub fn spawn(workers: usize, queue: Arc<WorkQueue>, reconciler: Arc<Reconciler>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let q = Arc::clone(&queue);
            let r = Arc::clone(&reconciler);
            let mut rx = shutdown_rx.clone();

            joins.push(tokio::spawn(async move {
                worker_loop(worker_id, q, r, &mut rx).await;
            }));
        }

        Self {
            queue,
            shutdown_tx,
            joins,
        }
    }

    pub fn request_shutdown(&self) {
        // send error just means every worker already exited
        let _ = self.shutdown_tx.send(true);
        self.queue.shutdown();
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            let _ = join.await;
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<WorkQueue>,
    reconciler: Arc<Reconciler>,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let key = tokio::select! {
            _ = shutdown_rx.changed() => continue,
            key = queue.next() => key,
        };
        let Some(key) = key else {
            break; // queue shut down
        };

        debug!(worker_id, %key, "reconciling");
        match reconciler.sync(&key).await {
            Ok(()) => queue.done(&key),
            Err(err) => {
                warn!(worker_id, %key, %err, "sync failed, requeueing");
                queue.requeue_err(&key);
            }
        }
    }
}
