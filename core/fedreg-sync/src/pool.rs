//! Fixed-size worker pool draining change notifications into the
//! publication reconciler.

use crate::publication::PublicationReconciler;
use fedreg_store::ChangeNotification;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Workers sharing one notification queue.
///
/// Each notification is an independent unit of work; there is no ordering
/// between notifications handled by different workers.
pub struct PublicationPool {
    workers: JoinSet<()>,
    stop: watch::Sender<bool>,
}

impl PublicationPool {
    /// Starts `size` workers (at least one) reading from `notifications`.
    pub fn start(
        reconciler: Arc<PublicationReconciler>,
        notifications: mpsc::UnboundedReceiver<ChangeNotification>,
        size: usize,
    ) -> Self {
        let queue = Arc::new(Mutex::new(notifications));
        let (stop, stop_rx) = watch::channel(false);
        let mut workers = JoinSet::new();
        for worker in 0..size.max(1) {
            let queue = Arc::clone(&queue);
            let reconciler = Arc::clone(&reconciler);
            let mut stop_rx = stop_rx.clone();
            workers.spawn(async move {
                loop {
                    let next = tokio::select! {
                        biased;
                        _ = stop_rx.changed() => None,
                        note = async { queue.lock().await.recv().await } => note,
                    };
                    let Some(notification) = next else {
                        break;
                    };
                    if let Some(outcome) = reconciler.handle(&notification).await {
                        debug!("Worker {} finished publication pass: {:?}", worker, outcome);
                    }
                }
                debug!("Publication worker {} exiting", worker);
            });
        }
        info!("Publication pool started with {} worker(s)", size.max(1));
        Self { workers, stop }
    }

    /// Stops taking new notifications and waits up to `grace` for in-flight
    /// work, then aborts whatever is left. Returns `true` if every worker
    /// finished on its own.
    pub async fn shutdown(mut self, grace: Duration) -> bool {
        let _ = self.stop.send(true);
        let drained = tokio::time::timeout(grace, async {
            while self.workers.join_next().await.is_some() {}
        })
        .await
        .is_ok();

        if !drained {
            warn!("Publication workers still busy after {:?}, aborting", grace);
            self.workers.abort_all();
            while self.workers.join_next().await.is_some() {}
        }
        info!("Publication pool stopped");
        drained
    }
}
