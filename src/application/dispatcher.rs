//! Bounded worker pool running one job per fetched record.

use crate::domain::records::SourceRecord;
use crate::error::PipelineError;
use futures::{Stream, StreamExt};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Outcome counters of one `dispatch_all` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Records handed to the pool
    pub dispatched: usize,
    /// Identifiers of records that could not be enqueued
    pub rejected: Vec<String>,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Default)]
struct Outcomes {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

pub struct JobDispatcher {
    workers: usize,
    queue_capacity: usize,
}

impl JobDispatcher {
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        Self {
            workers: workers.max(1),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Feeds every record of `records` to `job` on a fixed number of workers.
    ///
    /// Records are enqueued in stream order; when the queue is full the
    /// stream is not polled until a worker frees a slot. Jobs are independent
    /// and complete in any order. Returns once every enqueued job finished.
    pub async fn dispatch_all<S, F, Fut>(&self, records: S, job: F) -> DispatchReport
    where
        S: Stream<Item = SourceRecord>,
        F: Fn(SourceRecord) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), PipelineError>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<SourceRecord>(self.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));
        let job = Arc::new(job);
        let outcomes = Arc::new(Outcomes::default());

        let handles: Vec<JoinHandle<()>> = (0..self.workers)
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    rx.clone(),
                    job.clone(),
                    outcomes.clone(),
                ))
            })
            .collect();
        // Workers own the receiver from here on; if they all exit, sends fail.
        drop(rx);

        let mut report = DispatchReport::default();
        futures::pin_mut!(records);
        while let Some(record) = records.next().await {
            let record_id = record.id.clone();
            match tx.send(record).await {
                Ok(()) => {
                    debug!(record_id = %record_id, "Record dispatched");
                    report.dispatched += 1;
                }
                Err(_) => {
                    error!(record_id = %record_id, "Failed to enqueue record, no worker available");
                    report.rejected.push(record_id);
                }
            }
        }
        drop(tx);

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Worker task ended abnormally: {:?}", e);
            }
        }

        report.succeeded = outcomes.succeeded.load(Ordering::SeqCst);
        report.failed = outcomes.failed.load(Ordering::SeqCst);
        report
    }
}

/// Pulls records until the queue is closed and drained.
async fn worker_loop<F, Fut>(
    worker_id: usize,
    queue: Arc<Mutex<mpsc::Receiver<SourceRecord>>>,
    job: Arc<F>,
    outcomes: Arc<Outcomes>,
) where
    F: Fn(SourceRecord) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), PipelineError>> + Send + 'static,
{
    debug!(worker = worker_id, "Worker started");
    loop {
        let next = queue.lock().await.recv().await;
        let Some(record) = next else { break };
        let record_id = record.id.clone();

        // A panicking job must not take the worker down with it
        match tokio::spawn((*job)(record)).await {
            Ok(Ok(())) => {
                outcomes.succeeded.fetch_add(1, Ordering::SeqCst);
                info!(worker = worker_id, record_id = %record_id, "Job finished");
            }
            Ok(Err(e)) => {
                outcomes.failed.fetch_add(1, Ordering::SeqCst);
                warn!(
                    worker = worker_id,
                    record_id = %record_id,
                    category = ?e.category(),
                    "Job failed: {}",
                    e
                );
            }
            Err(e) => {
                outcomes.failed.fetch_add(1, Ordering::SeqCst);
                error!(worker = worker_id, record_id = %record_id, "Job aborted: {:?}", e);
            }
        }
    }
    debug!(worker = worker_id, "Worker stopped");
}
