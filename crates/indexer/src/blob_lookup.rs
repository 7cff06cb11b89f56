use crate::{Error, Result};
use blob_index::ShardIndex;
use models::{ByteRange, ContextId, Did, ProviderRecord};
use queue::CacheProvidersJob;
use std::sync::Arc;
use stores::{JobQueue, ShardIndexStore};

/// RetrievalAuth is the material for capability-delegated retrieval.
/// Building and verifying delegations belongs to the authorization
/// collaborator; this layer only forwards the proof chain.
#[derive(Clone, Debug)]
pub struct RetrievalAuth {
    pub issuer: Did,
    pub audience: Did,
    pub capability: String,
    pub proofs: Vec<Vec<u8>>,
}

/// BlobIndexLookup fetches and caches shard indexes. A fetch that
/// succeeds also enqueues a provider-record backfill for every digest
/// the index names; failure to enqueue fails the lookup so load pushes
/// back on the query path instead of silently dropping work.
pub struct BlobIndexLookup {
    cache: Arc<dyn ShardIndexStore>,
    queue: Arc<dyn JobQueue<CacheProvidersJob>>,
    http: reqwest::Client,
}

impl BlobIndexLookup {
    pub fn new(
        cache: Arc<dyn ShardIndexStore>,
        queue: Arc<dyn JobQueue<CacheProvidersJob>>,
        http: reqwest::Client,
    ) -> Self {
        Self { cache, queue, http }
    }

    pub async fn find(
        &self,
        context: &ContextId,
        record: &ProviderRecord,
        fetch_url: &url::Url,
        range: Option<ByteRange>,
        auth: Option<&RetrievalAuth>,
    ) -> Result<Arc<ShardIndex>> {
        if let Some(index) = self.cache.get(context).await? {
            return Ok(index);
        }

        let bytes = self.fetch(fetch_url, range, auth).await?;
        let index = Arc::new(ShardIndex::from_archive(&bytes)?);

        self.cache.put(context, index.clone(), true).await?;

        // Backfill provider records for everything the index names.
        queue::enqueue_backfill(self.queue.as_ref(), record.clone(), &index).await?;

        Ok(index)
    }

    async fn fetch(
        &self,
        url: &url::Url,
        range: Option<ByteRange>,
        auth: Option<&RetrievalAuth>,
    ) -> Result<Vec<u8>> {
        let mut request = self.http.get(url.clone());

        if let Some(range) = range {
            request = request.header(reqwest::header::RANGE, range.to_header());
        }
        if let Some(auth) = auth {
            // Delegated retrieval: the proof chain rides an
            // Authorization header the blob host's gateway understands.
            request = request.header(
                reqwest::header::AUTHORIZATION,
                format!(
                    "Delegation {}",
                    base64::encode(auth.proofs.concat())
                ),
            );
        }

        let response = request.send().await.map_err(|source| Error::Fetch {
            what: "shard index",
            source,
        })?;

        if !response.status().is_success() {
            return Err(Error::Status {
                what: "shard index",
                status: response.status(),
            });
        }

        Ok(response
            .bytes()
            .await
            .map_err(|source| Error::Fetch {
                what: "shard index",
                source,
            })?
            .to_vec())
    }
}
