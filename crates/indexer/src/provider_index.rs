use crate::Result;
use models::{ClaimKinds, ContextId, Did, Digest, ProviderRecord};
use publisher::{PublishOutcome, Publisher};
use std::sync::Arc;
use stores::{CacheResult, ProviderStore};

/// LegacyResolver synthesizes provider records from older storage
/// systems when the indexer has no answer for a digest. The default
/// deployment wires `NoLegacy`.
#[async_trait::async_trait]
pub trait LegacyResolver: Send + Sync + 'static {
    async fn resolve(&self, digest: &Digest) -> anyhow::Result<Vec<ProviderRecord>>;
}

pub struct NoLegacy;

#[async_trait::async_trait]
impl LegacyResolver for NoLegacy {
    async fn resolve(&self, _digest: &Digest) -> anyhow::Result<Vec<ProviderRecord>> {
        Ok(Vec::new())
    }
}

/// ProviderIndex resolves a digest to provider records through a
/// read-through cache over the remote indexer, with a pluggable legacy
/// fallback behind both.
pub struct ProviderIndex {
    store: Arc<dyn ProviderStore>,
    client: ipni::Client,
    legacy: Arc<dyn LegacyResolver>,
    publisher: Arc<Publisher>,
}

impl ProviderIndex {
    pub fn new(
        store: Arc<dyn ProviderStore>,
        client: ipni::Client,
        legacy: Arc<dyn LegacyResolver>,
        publisher: Arc<Publisher>,
    ) -> Self {
        Self {
            store,
            client,
            legacy,
            publisher,
        }
    }

    /// Resolve `digest` to matching provider records.
    ///
    /// Returns `None` when every resolution stage came up empty: "not
    /// found" is distinct from a cached empty result, which returns
    /// `Some` of an empty vector.
    pub async fn find(
        &self,
        digest: &Digest,
        subjects: &[Did],
        kinds: ClaimKinds,
    ) -> Result<Option<Vec<ProviderRecord>>> {
        let records = match self.store.members(digest).await? {
            CacheResult::Hit(records) => records,
            CacheResult::Empty => return Ok(Some(Vec::new())),
            CacheResult::Miss => match self.resolve(digest).await? {
                Some(records) => records,
                None => return Ok(None),
            },
        };
        Ok(Some(post_filter(records, digest, subjects, kinds)))
    }

    /// Resolve a cache miss: indexer first, then the legacy fallback.
    /// Whatever is found is written through; nothing found writes the
    /// shorter-lived empty marker and resolves "not found".
    async fn resolve(&self, digest: &Digest) -> Result<Option<Vec<ProviderRecord>>> {
        let found = self.client.find(digest).await?;

        let mut records = Vec::with_capacity(found.len());
        for result in &found {
            match result.to_record() {
                Ok(record) => records.push(record),
                // Records advertised with tags we don't speak are not
                // ours to interpret.
                Err(models::Error::UnknownTag(tag)) => {
                    tracing::debug!(%digest, tag, "dropping record with unrecognized metadata");
                }
                Err(err) => {
                    tracing::debug!(%digest, ?err, "dropping undecodable provider record");
                }
            }
        }

        if records.is_empty() {
            records = match self.legacy.resolve(digest).await {
                Ok(records) => records,
                Err(err) => {
                    // Partially readable history resolves as empty; the
                    // indexer's answer stands.
                    tracing::warn!(%digest, ?err, "legacy fallback failed; treating as empty");
                    Vec::new()
                }
            };
        }

        if records.is_empty() {
            self.store.set_empty(digest).await?;
            return Ok(None);
        }

        self.store.add(digest, &records, true).await?;
        Ok(Some(records))
    }

    /// Union a provider record into each digest's cache entry.
    /// Idempotent per `(digest, record)`; returns how many writes were
    /// new.
    pub async fn add(&self, digests: &[Digest], record: &ProviderRecord) -> Result<usize> {
        let mut written = 0;
        for digest in digests {
            written += self
                .store
                .add(digest, std::slice::from_ref(record), true)
                .await?;
        }
        Ok(written)
    }

    /// Advertise `digests` on the publisher chain and insert them into
    /// the local cache. Entries are pinned non-expirable until the
    /// advert is durable, then flipped expirable.
    pub async fn publish(
        &self,
        digests: &[Digest],
        record: &ProviderRecord,
    ) -> Result<PublishOutcome> {
        for digest in digests {
            self.store
                .add(digest, std::slice::from_ref(record), false)
                .await?;
        }

        let outcome = self
            .publisher
            .publish(&record.context_id, &record.metadata.to_bytes(), digests)
            .await
            .map_err(|err| match err {
                publisher::Error::Store(err) => crate::Error::Store(err),
                publisher::Error::Schema(err) => crate::Error::Ini(err),
                other => crate::Error::Store(stores::Error::Backend(other.into())),
            })?;

        for digest in digests {
            self.store.set_expirable(digest, true).await?;
        }
        Ok(outcome)
    }
}

/// Keep records whose metadata kind is allowed and, when subjects are
/// given, whose context binds one of them. Records carrying no subject
/// association always pass.
fn post_filter(
    records: Vec<ProviderRecord>,
    digest: &Digest,
    subjects: &[Did],
    kinds: ClaimKinds,
) -> Vec<ProviderRecord> {
    let scoped: Vec<ContextId> = subjects
        .iter()
        .map(|subject| ContextId::from_subject(subject, digest))
        .collect();

    records
        .into_iter()
        .filter(|record| kinds.matches(&record.metadata))
        .filter(|record| {
            subjects.is_empty()
                || record.context_id.is_digest(digest)
                || scoped.contains(&record.context_id)
        })
        .collect()
}
