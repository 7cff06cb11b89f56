use crate::{HandlerError, JobHandler};
use blob_index::ShardIndex;
use models::{Digest, ProviderRecord};
use std::collections::HashSet;
use std::sync::Arc;
use stores::{JobQueue, ProviderStore};

/// Maximum digests per queued message. The transport has a 256 KiB
/// message limit.
pub const MAX_DIGESTS: usize = 1000;
/// Maximum messages per transport batch.
pub const MAX_BATCH_ENTRIES: usize = 10;

/// CacheProvidersJob asks that `provider` be recorded as a provider of
/// every listed digest.
#[derive(Clone, Debug)]
pub struct CacheProvidersJob {
    pub provider: ProviderRecord,
    pub digests: Vec<Digest>,
}

/// Split the distinct slice digests of a shard index into messages of
/// at most `MAX_DIGESTS`, and enqueue them in transport batches of at
/// most `MAX_BATCH_ENTRIES`. A refusal from the queue propagates to the
/// caller: refusing to proceed is the backpressure that keeps the
/// cacher from oversubscribing the backing store.
pub async fn enqueue_backfill(
    queue: &dyn JobQueue<CacheProvidersJob>,
    provider: ProviderRecord,
    index: &ShardIndex,
) -> Result<(), stores::Error> {
    let mut seen = HashSet::new();
    let digests: Vec<Digest> = index
        .slice_digests()
        .filter(|digest| seen.insert((*digest).clone()))
        .cloned()
        .collect();

    for batch in digests
        .chunks(MAX_DIGESTS * MAX_BATCH_ENTRIES)
        .flat_map(|batch| batch.chunks(MAX_DIGESTS))
    {
        queue
            .queue(CacheProvidersJob {
                provider: provider.clone(),
                digests: batch.to_vec(),
            })
            .await?;
    }
    Ok(())
}

/// CacheProvidersHandler is the backfill worker: it unions the job's
/// provider record into the cache entry of every digest, then marks the
/// entries expirable.
pub struct CacheProvidersHandler {
    providers: Arc<dyn ProviderStore>,
}

impl CacheProvidersHandler {
    pub fn new(providers: Arc<dyn ProviderStore>) -> Self {
        Self { providers }
    }
}

#[async_trait::async_trait]
impl JobHandler<CacheProvidersJob> for CacheProvidersHandler {
    async fn handle(&self, job: CacheProvidersJob) -> Result<(), HandlerError> {
        let mut written = 0;

        for digest in &job.digests {
            written += self
                .providers
                .add(digest, std::slice::from_ref(&job.provider), false)
                .await
                .map_err(|err| HandlerError::Transient(err.into()))?;
        }
        for digest in &job.digests {
            self.providers
                .set_expirable(digest, true)
                .await
                .map_err(|err| HandlerError::Transient(err.into()))?;
        }

        tracing::debug!(
            provider = %job.provider.provider.peer,
            digests = job.digests.len(),
            written,
            "cached provider records"
        );
        Ok(())
    }

    fn identify(&self, job: &CacheProvidersJob) -> String {
        format!(
            "cache-providers({}, {} digests)",
            job.provider.provider.peer,
            job.digests.len()
        )
    }
}
