//! The caching work queue: a generic long-poll poller framework over
//! the `JobQueue` seam, and the provider-cacher handler that backfills
//! provider records for every digest of a fetched shard index.

mod poller;
pub use poller::{HandlerError, JobHandler, Poller, PollerConfig};

mod cacher;
pub use cacher::{
    enqueue_backfill, CacheProvidersHandler, CacheProvidersJob, MAX_BATCH_ENTRIES, MAX_DIGESTS,
};
