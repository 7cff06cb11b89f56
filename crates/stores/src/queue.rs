use crate::Error;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::Notify;

pub type JobId = u64;

/// QueuedJob is a job handed out by `JobQueue::read`, with its receipt
/// id and how many times it has been read.
#[derive(Clone, Debug)]
pub struct QueuedJob<J> {
    pub id: JobId,
    pub job: J,
    pub attempt: u32,
}

/// JobQueue is the durable work queue seam. `read` long-polls; a job it
/// returns stays invisible until `release` (make visible again, used
/// for retryable failures) or `delete` (permanent removal, used on
/// success and on permanent failure).
#[async_trait::async_trait]
pub trait JobQueue<J: Clone + Send + Sync + 'static>: Send + Sync + 'static {
    /// Accept a job, or refuse it with `Error::Saturated` under load.
    async fn queue(&self, job: J) -> Result<(), Error>;

    /// Return between 1 and `max` jobs, blocking while none are ready.
    async fn read(&self, max: usize) -> Result<Vec<QueuedJob<J>>, Error>;

    /// Make the job visible again without counting another attempt.
    async fn release(&self, id: JobId) -> Result<(), Error>;

    /// Remove the job permanently.
    async fn delete(&self, id: JobId) -> Result<(), Error>;
}

struct Stored<J> {
    job: J,
    attempt: u32,
}

struct State<J> {
    next_id: JobId,
    ready: VecDeque<JobId>,
    jobs: HashMap<JobId, Stored<J>>,
}

/// MemoryJobQueue is the in-process queue implementation: bounded,
/// notify-woken, with the same visibility semantics a durable transport
/// queue provides.
pub struct MemoryJobQueue<J> {
    capacity: usize,
    state: Mutex<State<J>>,
    notify: Notify,
}

impl<J> MemoryJobQueue<J> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(State {
                next_id: 1,
                ready: VecDeque::new(),
                jobs: HashMap::new(),
            }),
            notify: Notify::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl<J: Clone + Send + Sync + 'static> JobQueue<J> for MemoryJobQueue<J> {
    async fn queue(&self, job: J) -> Result<(), Error> {
        {
            let mut state = self.state.lock().unwrap();
            if state.jobs.len() >= self.capacity {
                return Err(Error::Saturated);
            }
            let id = state.next_id;
            state.next_id += 1;
            state.jobs.insert(id, Stored { job, attempt: 0 });
            state.ready.push_back(id);
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn read(&self, max: usize) -> Result<Vec<QueuedJob<J>>, Error> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock().unwrap();
                let mut batch = Vec::new();
                while batch.len() < max {
                    let Some(id) = state.ready.pop_front() else {
                        break;
                    };
                    let Some(stored) = state.jobs.get_mut(&id) else {
                        continue; // Deleted while ready.
                    };
                    stored.attempt += 1;
                    batch.push(QueuedJob {
                        id,
                        job: stored.job.clone(),
                        attempt: stored.attempt,
                    });
                }
                if !batch.is_empty() {
                    return Ok(batch);
                }
            }
            notified.await;
        }
    }

    async fn release(&self, id: JobId) -> Result<(), Error> {
        {
            let mut state = self.state.lock().unwrap();
            if !state.jobs.contains_key(&id) {
                return Ok(());
            }
            state.ready.push_back(id);
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn delete(&self, id: JobId) -> Result<(), Error> {
        self.state.lock().unwrap().jobs.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_read_release_delete_cycle() {
        let queue = MemoryJobQueue::new(16);
        queue.queue("a").await.unwrap();
        queue.queue("b").await.unwrap();

        let batch = queue.read(10).await.unwrap();
        assert_eq!(
            batch.iter().map(|j| j.job).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert_eq!(batch[0].attempt, 1);

        // Released jobs come back; attempt counts the re-read, not the release.
        queue.release(batch[0].id).await.unwrap();
        let again = queue.read(10).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].job, "a");
        assert_eq!(again[0].attempt, 2);

        queue.delete(batch[0].id).await.unwrap();
        queue.delete(batch[1].id).await.unwrap();
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_queue_rejects_when_saturated() {
        let queue = MemoryJobQueue::new(1);
        queue.queue(1u32).await.unwrap();
        assert!(matches!(queue.queue(2u32).await, Err(Error::Saturated)));

        // Deleting frees capacity.
        let batch = queue.read(1).await.unwrap();
        queue.delete(batch[0].id).await.unwrap();
        queue.queue(2u32).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_blocks_until_queued() {
        let queue = Arc::new(MemoryJobQueue::new(16));

        let reader = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.read(1).await.unwrap() })
        };

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!reader.is_finished());

        queue.queue("late").await.unwrap();
        let batch = reader.await.unwrap();
        assert_eq!(batch[0].job, "late");
    }
}
