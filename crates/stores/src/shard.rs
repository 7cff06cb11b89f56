use crate::Error;
use blob_index::ShardIndex;
use models::ContextId;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// ShardIndexStore caches parsed shard indexes keyed by context ID.
/// Values are immutable given their context, so key-level last-writer-
/// wins is acceptable.
#[async_trait::async_trait]
pub trait ShardIndexStore: Send + Sync + 'static {
    async fn get(&self, context: &ContextId) -> Result<Option<Arc<ShardIndex>>, Error>;

    async fn put(
        &self,
        context: &ContextId,
        index: Arc<ShardIndex>,
        expirable: bool,
    ) -> Result<(), Error>;

    /// Flip the expirable bit of an existing entry.
    async fn set_expirable(&self, context: &ContextId, expirable: bool) -> Result<(), Error>;
}

#[derive(Clone)]
struct Entry {
    index: Arc<ShardIndex>,
    expirable: bool,
}

struct Expiry {
    ttl: Duration,
}

impl Expiry {
    fn ttl(&self, entry: &Entry) -> Option<Duration> {
        entry.expirable.then_some(self.ttl)
    }
}

impl moka::Expiry<Vec<u8>, Entry> for Expiry {
    fn expire_after_create(&self, _: &Vec<u8>, entry: &Entry, _: Instant) -> Option<Duration> {
        self.ttl(entry)
    }

    fn expire_after_update(
        &self,
        _: &Vec<u8>,
        entry: &Entry,
        _: Instant,
        _: Option<Duration>,
    ) -> Option<Duration> {
        self.ttl(entry)
    }
}

pub struct MemoryShardIndexStore {
    cache: moka::future::Cache<Vec<u8>, Entry>,
}

impl MemoryShardIndexStore {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let cache = moka::future::Cache::builder()
            .max_capacity(capacity)
            .expire_after(Expiry { ttl })
            .build();
        Self { cache }
    }
}

impl Default for MemoryShardIndexStore {
    fn default() -> Self {
        Self::new(1 << 16, Duration::from_secs(30 * 60))
    }
}

#[async_trait::async_trait]
impl ShardIndexStore for MemoryShardIndexStore {
    async fn get(&self, context: &ContextId) -> Result<Option<Arc<ShardIndex>>, Error> {
        Ok(self
            .cache
            .get(context.as_bytes())
            .await
            .map(|entry| entry.index))
    }

    async fn put(
        &self,
        context: &ContextId,
        index: Arc<ShardIndex>,
        expirable: bool,
    ) -> Result<(), Error> {
        self.cache
            .insert(context.as_bytes().to_vec(), Entry { index, expirable })
            .await;
        Ok(())
    }

    async fn set_expirable(&self, context: &ContextId, expirable: bool) -> Result<(), Error> {
        if let Some(entry) = self.cache.get(context.as_bytes()).await {
            self.cache
                .insert(
                    context.as_bytes().to_vec(),
                    Entry {
                        index: entry.index,
                        expirable,
                    },
                )
                .await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use models::Digest;

    #[tokio::test]
    async fn test_round_trip_and_miss() {
        let store = MemoryShardIndexStore::default();
        let digest = Digest::sha2_256(b"root");
        let context = ContextId::from_digest(&digest);

        assert!(store.get(&context).await.unwrap().is_none());

        let index = Arc::new(ShardIndex::new(digest));
        store.put(&context, index.clone(), true).await.unwrap();

        let cached = store.get(&context).await.unwrap().unwrap();
        assert_eq!(cached.content(), index.content());
    }
}
