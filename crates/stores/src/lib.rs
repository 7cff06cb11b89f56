//! Capability seams over the service's persisted state, plus in-memory
//! implementations of each. Swapping a backing store means implementing
//! the corresponding trait; nothing else in the workspace changes.

mod provider;
pub use provider::{CacheResult, MemoryProviderStore, ProviderStore, ProviderStoreConfig};

mod shard;
pub use shard::{MemoryShardIndexStore, ShardIndexStore};

mod claim;
pub use claim::{ClaimStore, MemoryClaimStore};

mod advert;
pub use advert::{AdvertStore, ContextTable, MemoryAdvertStore, MemoryContextTable};

mod queue;
pub use queue::{JobId, JobQueue, MemoryJobQueue, QueuedJob};

/// Error is the failure surface of every store seam.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The queue refused the job under load. Surfacing this to writers
    /// is the backpressure mechanism.
    #[error("job queue is saturated")]
    Saturated,
    /// A head compare-and-set found a different stored value. Retryable.
    #[error("head precondition failed")]
    PreconditionFailed,
    /// Failure of a pluggable backing store.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl Error {
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, Self::PreconditionFailed)
    }
}
