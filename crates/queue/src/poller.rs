use std::sync::Arc;
use std::time::Duration;
use stores::{JobQueue, QueuedJob};

/// HandlerError classifies a failed job so the poller can decide its
/// fate: transient failures are released for retry, permanent failures
/// are deleted.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("transient failure")]
    Transient(#[source] anyhow::Error),
    #[error("permanent failure")]
    Permanent(#[source] anyhow::Error),
}

/// JobHandler processes one job at a time under the poller's timeout.
#[async_trait::async_trait]
pub trait JobHandler<J>: Send + Sync + 'static {
    async fn handle(&self, job: J) -> Result<(), HandlerError>;

    /// A short identity for the job, used in logs.
    fn identify(&self, job: &J) -> String;
}

#[derive(Clone, Debug)]
pub struct PollerConfig {
    /// Concurrent handler invocations.
    pub concurrency: usize,
    /// Jobs per queue read. The transport caps batches at 10.
    pub batch_size: usize,
    /// Per-job deadline. Jobs exceeding it are deleted, not retried:
    /// the next query for those digests re-triggers the path.
    pub job_timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            concurrency: 100,
            batch_size: 10,
            job_timeout: Duration::from_secs(5 * 60),
        }
    }
}

/// Poller drives a `JobHandler` from a `JobQueue`: one long-poll read
/// loop feeding a semaphore-bounded pool of handler tasks.
pub struct Poller<J: Clone + Send + Sync + 'static> {
    queue: Arc<dyn JobQueue<J>>,
    handler: Arc<dyn JobHandler<J>>,
    config: PollerConfig,
}

impl<J: Clone + Send + Sync + 'static> Poller<J> {
    pub fn new(
        queue: Arc<dyn JobQueue<J>>,
        handler: Arc<dyn JobHandler<J>>,
        config: PollerConfig,
    ) -> Self {
        Self {
            queue,
            handler,
            config,
        }
    }

    /// Serve until `shutdown` resolves, then wait for in-flight
    /// handlers to finish.
    pub async fn serve(self, shutdown: impl std::future::Future<Output = ()>) {
        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.config.concurrency));
        tokio::pin!(shutdown);

        loop {
            // Block until at least one handler slot is free, so reads
            // never outpace the pool by more than a batch.
            let Ok(slot) = semaphore.clone().acquire_owned().await else {
                break;
            };

            let read = self.queue.read(self.config.batch_size.min(10));
            let batch = tokio::select! {
                batch = read => batch,
                () = &mut shutdown => break,
            };

            let batch = match batch {
                Ok(batch) => batch,
                Err(err) => {
                    tracing::error!(?err, "failed to read from job queue (will retry)");
                    drop(slot);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };
            drop(slot);

            for queued in batch {
                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .expect("semaphore is never closed");

                let queue = self.queue.clone();
                let handler = self.handler.clone();
                let job_timeout = self.config.job_timeout;

                tokio::spawn(async move {
                    let _permit = permit;
                    () = poll_job(queue, handler, queued, job_timeout).await;
                });
            }
        }

        tracing::info!("job polling loop signaled to stop and is awaiting running jobs");

        // All permits are free only once every running handler is done.
        let _ = semaphore
            .acquire_many(self.config.concurrency as u32)
            .await
            .expect("semaphore is never closed");
    }
}

async fn poll_job<J: Clone + Send + Sync + 'static>(
    queue: Arc<dyn JobQueue<J>>,
    handler: Arc<dyn JobHandler<J>>,
    queued: QueuedJob<J>,
    job_timeout: Duration,
) {
    let identity = handler.identify(&queued.job);
    let attempt = queued.attempt;

    let outcome = tokio::time::timeout(job_timeout, handler.handle(queued.job)).await;

    let result = match outcome {
        Ok(Ok(())) => {
            tracing::debug!(job = %identity, attempt, "job completed");
            queue.delete(queued.id).await
        }
        Err(_elapsed) => {
            // Deliberately deleted rather than released: a job that
            // blows the deadline would wedge the queue on redelivery.
            tracing::warn!(job = %identity, attempt, "job deadline exceeded; dropping");
            queue.delete(queued.id).await
        }
        Ok(Err(HandlerError::Transient(err))) => {
            tracing::warn!(job = %identity, attempt, ?err, "job failed; will retry");
            queue.release(queued.id).await
        }
        Ok(Err(HandlerError::Permanent(err))) => {
            tracing::error!(job = %identity, attempt, ?err, "job failed permanently; dropping");
            queue.delete(queued.id).await
        }
    };

    if let Err(err) = result {
        tracing::error!(job = %identity, ?err, "failed to settle job with queue");
    }
}
