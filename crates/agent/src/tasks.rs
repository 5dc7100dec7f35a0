//! Detached task queue for fire-and-forget side effects.
//!
//! Audit records, memory extraction and recall indexing are submitted here.
//! The caller never awaits them and their failures only reach the log.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};

struct Job {
    name: &'static str,
    task: BoxFuture<'static, ()>,
}

#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn finish(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Handle to the detached task queue. Cheap to clone.
#[derive(Clone)]
pub struct DetachedTasks {
    tx: mpsc::Sender<Job>,
    in_flight: Arc<InFlight>,
}

impl DetachedTasks {
    /// Start the queue worker. Must be called inside a tokio runtime.
    pub fn spawn(capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Job>(capacity.max(1));
        let in_flight = Arc::new(InFlight::default());

        let worker_in_flight = in_flight.clone();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let in_flight = worker_in_flight.clone();
                tokio::spawn(async move {
                    job.task.await;
                    debug!(task = job.name, "Detached task finished");
                    in_flight.finish();
                });
            }
        });

        Self { tx, in_flight }
    }

    /// Queue `task`. Returns immediately; a full queue drops the task.
    pub fn submit<F>(&self, name: &'static str, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.in_flight.count.fetch_add(1, Ordering::SeqCst);
        let job = Job {
            name,
            task: Box::pin(task),
        };
        if let Err(e) = self.tx.try_send(job) {
            warn!(task = name, error = %e, "Detached task dropped");
            self.in_flight.finish();
        }
    }

    /// Number of submitted tasks that have not finished.
    pub fn pending(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    /// Wait until every submitted task has finished. Used at shutdown and in
    /// tests; the request path never calls it.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.in_flight.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}
