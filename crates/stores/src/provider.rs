use crate::Error;
use models::{Digest, ProviderRecord};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// CacheResult distinguishes the three states a digest may be in:
/// cached records, a cached empty result, or never written. "Empty" and
/// "miss" are distinct so that a negative answer from upstream is not
/// re-fetched on every query.
#[derive(Clone, Debug, PartialEq)]
pub enum CacheResult {
    Hit(Vec<ProviderRecord>),
    Empty,
    Miss,
}

/// ProviderStore is the per-digest cache of provider records.
///
/// The per-digest value is a grow-only set: `add` unions records in and
/// reports how many were newly written, so concurrent writers converge
/// without coordination.
#[async_trait::async_trait]
pub trait ProviderStore: Send + Sync + 'static {
    async fn members(&self, digest: &Digest) -> Result<CacheResult, Error>;

    /// Union `records` into the digest's set. Returns the number of
    /// records not already present. `expirable` applies to the whole
    /// entry: a false value pins it until flipped.
    async fn add(
        &self,
        digest: &Digest,
        records: &[ProviderRecord],
        expirable: bool,
    ) -> Result<usize, Error>;

    /// Record that upstream resolution found nothing for this digest.
    async fn set_empty(&self, digest: &Digest) -> Result<(), Error>;

    /// Flip the expirable bit of an existing entry. Unknown digests are
    /// a no-op.
    async fn set_expirable(&self, digest: &Digest, expirable: bool) -> Result<(), Error>;

    /// Drop the entry so the next read repopulates from upstream.
    async fn invalidate(&self, digest: &Digest) -> Result<(), Error>;
}

#[derive(Clone, Debug)]
pub struct ProviderStoreConfig {
    pub capacity: u64,
    /// TTL of expirable record entries.
    pub record_ttl: Duration,
    /// TTL of cached-empty markers; shorter, as a safety net under the
    /// explicit invalidation done by remote sync.
    pub empty_ttl: Duration,
}

impl Default for ProviderStoreConfig {
    fn default() -> Self {
        Self {
            capacity: 1 << 20,
            record_ttl: Duration::from_secs(30 * 60),
            empty_ttl: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Clone)]
enum Entry {
    Records {
        records: Arc<Vec<ProviderRecord>>,
        expirable: bool,
    },
    Empty,
}

struct Expiry {
    record_ttl: Duration,
    empty_ttl: Duration,
}

impl Expiry {
    fn ttl(&self, entry: &Entry) -> Option<Duration> {
        match entry {
            Entry::Records {
                expirable: false, ..
            } => None,
            Entry::Records {
                expirable: true, ..
            } => Some(self.record_ttl),
            Entry::Empty => Some(self.empty_ttl),
        }
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

/// MemoryProviderStore keeps provider records in a moka cache with
/// per-entry expiry derived from the entry kind and its expirable bit.
pub struct MemoryProviderStore {
    cache: moka::future::Cache<Vec<u8>, Entry>,
}

impl MemoryProviderStore {
    pub fn new(config: ProviderStoreConfig) -> Self {
        let cache = moka::future::Cache::builder()
            .max_capacity(config.capacity)
            .expire_after(Expiry {
                record_ttl: config.record_ttl,
                empty_ttl: config.empty_ttl,
            })
            .build();
        Self { cache }
    }

    fn key(digest: &Digest) -> Vec<u8> {
        digest.to_bytes()
    }
}

impl Default for MemoryProviderStore {
    fn default() -> Self {
        Self::new(ProviderStoreConfig::default())
    }
}

#[async_trait::async_trait]
impl ProviderStore for MemoryProviderStore {
    async fn members(&self, digest: &Digest) -> Result<CacheResult, Error> {
        Ok(match self.cache.get(&Self::key(digest)).await {
            Some(Entry::Records { records, .. }) => CacheResult::Hit(records.as_ref().clone()),
            Some(Entry::Empty) => CacheResult::Empty,
            None => CacheResult::Miss,
        })
    }

    async fn add(
        &self,
        digest: &Digest,
        records: &[ProviderRecord],
        expirable: bool,
    ) -> Result<usize, Error> {
        let written = Arc::new(AtomicUsize::new(0));
        let written_clone = written.clone();

        let _entry = self
            .cache
            .entry(Self::key(digest))
            .and_upsert_with(|current| {
                let mut merged = match current.map(|e| e.into_value()) {
                    Some(Entry::Records { records, .. }) => records.as_ref().clone(),
                    Some(Entry::Empty) | None => Vec::new(),
                };
                for record in records {
                    if !merged.contains(record) {
                        merged.push(record.clone());
                        written_clone.fetch_add(1, Ordering::Relaxed);
                    }
                }
                std::future::ready(Entry::Records {
                    records: Arc::new(merged),
                    expirable,
                })
            })
            .await;

        Ok(written.load(Ordering::Relaxed))
    }

    async fn set_empty(&self, digest: &Digest) -> Result<(), Error> {
        self.cache.insert(Self::key(digest), Entry::Empty).await;
        Ok(())
    }

    async fn set_expirable(&self, digest: &Digest, expirable: bool) -> Result<(), Error> {
        let key = Self::key(digest);
        if let Some(Entry::Records { records, .. }) = self.cache.get(&key).await {
            self.cache
                .insert(
                    key,
                    Entry::Records {
                        records,
                        expirable,
                    },
                )
                .await;
        }
        Ok(())
    }

    async fn invalidate(&self, digest: &Digest) -> Result<(), Error> {
        self.cache.invalidate(&Self::key(digest)).await;
        Ok(())
    }
}
