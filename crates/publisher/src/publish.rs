use crate::{Error, Result};
use ipni::{Advertisement, EntriesChunk, Keypair, SignedHead, MAX_CHUNK_ENTRIES};
use models::{Cid, ContextId, Digest, ProviderInfo};
use std::sync::Arc;
use stores::{AdvertStore, ContextTable};

/// Bound on head compare-and-set retries under writer contention.
const MAX_CAS_ATTEMPTS: usize = 5;

/// PublishOutcome distinguishes a fresh advert from an idempotent
/// re-publication of the same `(provider, contextID)` payload.
#[derive(Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    Published(Cid),
    AlreadyAdvertised,
}

#[derive(Clone)]
pub struct PublisherConfig {
    /// The topic remote indexer nodes subscribe to.
    pub topic: String,
    /// Direct-announce endpoints notified after each head update.
    pub announce_urls: Vec<url::Url>,
}

/// Publisher turns digest batches into signed advertisements on the
/// chain. The head pointer is the chain's only serialization point:
/// concurrent publishers race the compare-and-set and the loser
/// rebuilds against the new head.
pub struct Publisher {
    keypair: Keypair,
    provider: ProviderInfo,
    store: Arc<dyn AdvertStore>,
    chunk_links: Arc<dyn ContextTable>,
    metadata: Arc<dyn ContextTable>,
    client: ipni::Client,
    config: PublisherConfig,
}

impl Publisher {
    pub fn new(
        keypair: Keypair,
        provider: ProviderInfo,
        store: Arc<dyn AdvertStore>,
        chunk_links: Arc<dyn ContextTable>,
        metadata: Arc<dyn ContextTable>,
        client: ipni::Client,
        config: PublisherConfig,
    ) -> Self {
        Self {
            keypair,
            provider,
            store,
            chunk_links,
            metadata,
            client,
            config,
        }
    }

    pub fn provider(&self) -> &ProviderInfo {
        &self.provider
    }

    /// Append an advertisement for `digests` under `context`.
    ///
    /// Re-publishing an identical `(provider, contextID, metadata)`
    /// returns `AlreadyAdvertised` without touching the chain.
    pub async fn publish(
        &self,
        context: &ContextId,
        metadata: &[u8],
        digests: &[Digest],
    ) -> Result<PublishOutcome> {
        if digests.is_empty() {
            return Err(Error::EmptyDigests);
        }

        let peer = &self.provider.peer;
        if let Some(previous) = self.metadata.get(peer, context).await? {
            if previous == metadata && self.chunk_links.get(peer, context).await?.is_some() {
                tracing::debug!(context = ?context, "context already advertised");
                return Ok(PublishOutcome::AlreadyAdvertised);
            }
        }

        let entries = self.write_entries(digests).await?;
        let advert_cid = self.append(context, metadata, entries.clone()).await?;

        self.chunk_links
            .put(peer, context, entries.to_bytes())
            .await?;
        self.metadata.put(peer, context, metadata.to_vec()).await?;

        self.announce(&advert_cid).await;
        Ok(PublishOutcome::Published(advert_cid))
    }

    /// Store the entries chunks, newest first, and return the link to
    /// the newest chunk. The oldest chunk's next link is null.
    async fn write_entries(&self, digests: &[Digest]) -> Result<Cid> {
        let mut next = None;
        for entries in digests.chunks(MAX_CHUNK_ENTRIES).rev() {
            let chunk = EntriesChunk {
                entries: entries.to_vec(),
                next,
            };
            let cid = chunk.cid();
            self.store.put_block(&cid, chunk.to_bytes()).await?;
            next = Some(cid);
        }
        next.ok_or(Error::EmptyDigests)
    }

    /// Append one advert referencing `entries`, serialized through the
    /// signed head's compare-and-set. This loop is the publisher's only
    /// internal retry.
    async fn append(&self, context: &ContextId, metadata: &[u8], entries: Cid) -> Result<Cid> {
        for _attempt in 0..MAX_CAS_ATTEMPTS {
            let head_bytes = self.store.head().await?;
            let previous = match &head_bytes {
                Some(bytes) => {
                    let head = SignedHead::from_bytes(bytes)?;
                    head.verify()?;
                    Some(head.head)
                }
                None => None,
            };

            let mut advert = Advertisement {
                previous,
                provider: self.provider.clone(),
                context_id: context.clone(),
                metadata: metadata.to_vec(),
                entries: Some(entries.clone()),
                is_rm: false,
                extended_providers: Vec::new(),
                public_key: [0; 32],
                signature: Vec::new(),
            };
            advert.sign(&self.keypair);

            let advert_cid = advert.cid();
            self.store.put_block(&advert_cid, advert.to_bytes()).await?;

            let next_head =
                SignedHead::new(advert_cid.clone(), self.config.topic.clone(), &self.keypair);

            match self
                .store
                .cas_head(head_bytes.as_deref(), next_head.to_bytes())
                .await
            {
                Ok(()) => {
                    tracing::info!(advert = %advert_cid, "advanced advert chain head");
                    return Ok(advert_cid);
                }
                Err(err) if err.is_precondition_failed() => {
                    tracing::debug!(advert = %advert_cid, "lost head race; rebuilding");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(Error::HeadContention(MAX_CAS_ATTEMPTS))
    }

    async fn announce(&self, advert: &Cid) {
        let announce = ipni::wire::Announce {
            cid: advert.clone(),
            addresses: self.provider.addresses.clone(),
        };
        for url in &self.config.announce_urls {
            // The chain is already durable and remote nodes also poll,
            // so a failed announce is not fatal to the publish.
            if let Err(err) = self.client.announce(url, &announce).await {
                tracing::warn!(%url, ?err, "failed to announce new head");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use stores::{MemoryAdvertStore, MemoryContextTable};

    fn publisher(store: Arc<MemoryAdvertStore>) -> Publisher {
        let keypair = Keypair::generate();
        let provider = ProviderInfo {
            peer: keypair.peer_id(),
            addresses: vec!["https://cairn.example/".parse().unwrap()],
        };
        Publisher::new(
            keypair,
            provider,
            store,
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
        )
    }

    async fn chain_len(store: &MemoryAdvertStore) -> usize {
        let Some(head) = store.head().await.unwrap() else {
            return 0;
        };
        let head = SignedHead::from_bytes(&head).unwrap();
        let mut cursor = Some(head.head);
        let mut length = 0;
        while let Some(cid) = cursor {
            let block = store.get_block(&cid).await.unwrap().unwrap();
            let advert = Advertisement::from_bytes(&block).unwrap();
            advert.verify().unwrap();
            length += 1;
            cursor = advert.previous;
        }
        length
    }

    fn digests(n: usize) -> Vec<Digest> {
        (0..n)
            .map(|i| Digest::sha2_256(format!("digest-{i}").as_bytes()))
            .collect()
    }

    #[tokio::test]
    async fn test_publish_appends_and_republish_is_idempotent() {
        let store = Arc::new(MemoryAdvertStore::default());
        let publisher = publisher(store.clone());

        let batch = digests(3);
        let context = ContextId::from_digest(&batch[0]);

        let first = publisher.publish(&context, b"meta", &batch).await.unwrap();
        assert!(matches!(first, PublishOutcome::Published(_)));
        assert_eq!(chain_len(&store).await, 1);

        // Identical payload: the chain is left unchanged.
        let again = publisher.publish(&context, b"meta", &batch).await.unwrap();
        assert_eq!(again, PublishOutcome::AlreadyAdvertised);
        assert_eq!(chain_len(&store).await, 1);

        // Different metadata under the same context re-advertises.
        let other = publisher.publish(&context, b"meta2", &batch).await.unwrap();
        assert!(matches!(other, PublishOutcome::Published(_)));
        assert_eq!(chain_len(&store).await, 2);
    }

    #[tokio::test]
    async fn test_publish_rejects_empty_digests() {
        let store = Arc::new(MemoryAdvertStore::default());
        let publisher = publisher(store);
        let context = ContextId::from_digest(&Digest::sha2_256(b"d"));

        assert!(matches!(
            publisher.publish(&context, b"meta", &[]).await,
            Err(Error::EmptyDigests)
        ));
    }

    #[tokio::test]
    async fn test_chunk_boundary_at_chunk_capacity() {
        let store = Arc::new(MemoryAdvertStore::default());
        let publisher = publisher(store.clone());

        // Exactly one full chunk.
        let batch = digests(MAX_CHUNK_ENTRIES);
        let context = ContextId::from_digest(&batch[0]);
        publisher.publish(&context, b"meta", &batch).await.unwrap();

        let entries = entries_of_head(&store).await;
        let chunk = read_chunk(&store, &entries).await;
        assert_eq!(chunk.entries.len(), MAX_CHUNK_ENTRIES);
        assert!(chunk.next.is_none());

        // One past capacity: chunks of {16384, 1}, newest-first link.
        let batch = digests(MAX_CHUNK_ENTRIES + 1);
        let context = ContextId::from_digest(&Digest::sha2_256(b"second"));
        publisher.publish(&context, b"meta", &batch).await.unwrap();

        let entries = entries_of_head(&store).await;
        let first = read_chunk(&store, &entries).await;
        assert_eq!(first.entries.len(), MAX_CHUNK_ENTRIES);
        let second = read_chunk(&store, &first.next.unwrap()).await;
        assert_eq!(second.entries.len(), 1);
        assert!(second.next.is_none());
    }

    async fn entries_of_head(store: &MemoryAdvertStore) -> Cid {
        let head = SignedHead::from_bytes(&store.head().await.unwrap().unwrap()).unwrap();
        let block = store.get_block(&head.head).await.unwrap().unwrap();
        Advertisement::from_bytes(&block).unwrap().entries.unwrap()
    }

    async fn read_chunk(store: &MemoryAdvertStore, cid: &Cid) -> EntriesChunk {
        EntriesChunk::from_bytes(&store.get_block(cid).await.unwrap().unwrap()).unwrap()
    }
}
