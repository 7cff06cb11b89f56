use crate::{Error, Result};
use ipni::{Advertisement, EntriesChunk};
use models::Cid;
use std::sync::Arc;
use stores::{AdvertStore, ProviderStore};

/// SyncConsumer reacts to a remote head advance by walking the advert
/// chain backward from the new head to the previously observed head,
/// invalidating the provider-cache entry of every digest named along
/// the way so subsequent lookups repopulate from the indexer.
///
/// Notifications arrive serially and in monotonic head order, so the
/// walk never races its own invalidations.
pub struct SyncConsumer {
    store: Arc<dyn AdvertStore>,
    providers: Arc<dyn ProviderStore>,
}

impl SyncConsumer {
    pub fn new(store: Arc<dyn AdvertStore>, providers: Arc<dyn ProviderStore>) -> Self {
        Self { store, providers }
    }

    #[tracing::instrument(skip(self), err)]
    pub async fn handle(&self, head: Cid, previous: Option<Cid>) -> Result<()> {
        let mut cursor = Some(head);
        let mut adverts = 0usize;
        let mut invalidated = 0usize;

        while let Some(cid) = cursor {
            if Some(&cid) == previous.as_ref() {
                break;
            }

            let Some(block) = self.store.get_block(&cid).await? else {
                // The chain may extend past our retention; what we have
                // already walked is still invalidated.
                tracing::warn!(advert = %cid, "advert chain truncated at missing block");
                break;
            };
            let advert = Advertisement::from_bytes(&block)?;
            adverts += 1;

            invalidated += self.invalidate_entries(&advert).await?;
            cursor = advert.previous;
        }

        tracing::info!(adverts, invalidated, "completed remote sync");
        Ok(())
    }

    async fn invalidate_entries(&self, advert: &Advertisement) -> Result<usize> {
        let mut invalidated = 0usize;
        let mut cursor = advert.entries.clone();

        while let Some(cid) = cursor {
            let block = self
                .store
                .get_block(&cid)
                .await?
                .ok_or_else(|| Error::MissingBlock(cid.clone()))?;
            let chunk = EntriesChunk::from_bytes(&block)?;

            for digest in &chunk.entries {
                self.providers.invalidate(digest).await?;
                invalidated += 1;
            }
            cursor = chunk.next;
        }
        Ok(invalidated)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Publisher, PublisherConfig};
    use ipni::Keypair;
    use models::{ContextId, Digest, ProviderInfo};
    use stores::{CacheResult, MemoryAdvertStore, MemoryContextTable, MemoryProviderStore};

    struct Fixture {
        store: Arc<MemoryAdvertStore>,
        providers: Arc<MemoryProviderStore>,
        publisher: Publisher,
        consumer: SyncConsumer,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryAdvertStore::default());
        let providers = Arc::new(MemoryProviderStore::default());
        let keypair = Keypair::generate();
        let provider = ProviderInfo {
            peer: keypair.peer_id(),
            addresses: vec!["https://cairn.example/".parse().unwrap()],
        };
        let publisher = Publisher::new(
            keypair,
            provider,
            store.clone(),
            Arc::new(MemoryContextTable::default()),
            Arc::new(MemoryContextTable::default()),
            ipni::Client::new(
                reqwest::Client::new(),
                "https://indexer.example/".parse().unwrap(),
            ),
            PublisherConfig {
                topic: "/indexer/ingest/testnet".to_string(),
                announce_urls: Vec::new(),
            },
        );
        let consumer = SyncConsumer::new(store.clone(), providers.clone());
        Fixture {
            store,
            providers,
            publisher,
            consumer,
        }
    }

    async fn head_of(store: &MemoryAdvertStore) -> Cid {
        ipni::SignedHead::from_bytes(&store.head().await.unwrap().unwrap())
            .unwrap()
            .head
    }

    #[tokio::test]
    async fn test_sync_invalidates_cached_empties() {
        let Fixture {
            store,
            providers,
            publisher,
            consumer,
        } = fixture();

        let d3 = Digest::sha2_256(b"D3");
        providers.set_empty(&d3).await.unwrap();
        assert_eq!(providers.members(&d3).await.unwrap(), CacheResult::Empty);

        // The remote chain advances with an advert listing D3.
        publisher
            .publish(&ContextId::from_digest(&d3), b"meta", &[d3.clone()])
            .await
            .unwrap();

        consumer.handle(head_of(&store).await, None).await.unwrap();

        // The cached empty is gone; the next find repopulates.
        assert_eq!(providers.members(&d3).await.unwrap(), CacheResult::Miss);
    }

    #[tokio::test]
    async fn test_sync_stops_at_previous_head() {
        let Fixture {
            store,
            providers,
            publisher,
            consumer,
        } = fixture();

        let old = Digest::sha2_256(b"old");
        let new = Digest::sha2_256(b"new");

        publisher
            .publish(&ContextId::from_digest(&old), b"meta", &[old.clone()])
            .await
            .unwrap();
        let prev_head = head_of(&store).await;

        publisher
            .publish(&ContextId::from_digest(&new), b"meta", &[new.clone()])
            .await
            .unwrap();

        // Seed both digests with cached empties; only the digest in the
        // new advert should be invalidated.
        providers.set_empty(&old).await.unwrap();
        providers.set_empty(&new).await.unwrap();

        consumer
            .handle(head_of(&store).await, Some(prev_head))
            .await
            .unwrap();

        assert_eq!(providers.members(&old).await.unwrap(), CacheResult::Empty);
        assert_eq!(providers.members(&new).await.unwrap(), CacheResult::Miss);
    }
}
