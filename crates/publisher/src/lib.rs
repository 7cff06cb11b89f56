//! The publication side of the service: appending signed
//! advertisements to the chain remote indexer nodes sync, watching a
//! remote chain head, and invalidating local caches when it advances.

mod publish;
pub use publish::{PublishOutcome, Publisher, PublisherConfig};

mod notifier;
pub use notifier::{HeadCallback, HeadNotifier, NotifierConfig};

mod consumer;
pub use consumer::SyncConsumer;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no digests to publish")]
    EmptyDigests,
    #[error("head compare-and-set still contended after {0} attempts")]
    HeadContention(usize),
    #[error("advert chain block {0} is missing from the store")]
    MissingBlock(models::Cid),
    #[error(transparent)]
    Store(#[from] stores::Error),
    #[error(transparent)]
    Schema(#[from] ipni::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
