//! The query engine: digest-to-provider resolution layered over cache,
//! remote indexer, and legacy fallback; hash-verified claim lookup;
//! read-through shard-index fetching; and the concurrent walker that
//! assembles the closure of claims and indexes for a query.

mod provider_index;
pub use provider_index::{LegacyResolver, NoLegacy, ProviderIndex};

mod claims;
pub use claims::ClaimLookup;

mod blob_lookup;
pub use blob_lookup::{BlobIndexLookup, RetrievalAuth};

mod walker;
pub use walker::{QueryWalker, WalkResult};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Ini(#[from] ipni::Error),
    #[error(transparent)]
    Store(#[from] stores::Error),
    #[error("failed to fetch {what} from provider")]
    Fetch {
        what: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("provider returned status {status} fetching {what}")]
    Status {
        what: &'static str,
        status: reqwest::StatusCode,
    },
    #[error("failed to decode claim")]
    DecodeClaim(#[source] models::Error),
    #[error("failed to decode shard index")]
    DecodeIndex(#[from] blob_index::Error),
    #[error("claim {cid} bytes do not hash to its content id")]
    ClaimHashMismatch { cid: models::Cid },
    #[error("location claim for {digest} carries no retrievable url")]
    NoLocation { digest: models::Digest },
}

impl Error {
    /// Whether a retry may succeed. Decode failures and hash mismatches
    /// are permanent; network faults and upstream non-2xx are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Fetch { .. } | Self::Status { .. } => true,
            Self::Ini(err) => err.is_transient(),
            Self::Store(_)
            | Self::DecodeClaim(_)
            | Self::DecodeIndex(_)
            | Self::ClaimHashMismatch { .. }
            | Self::NoLocation { .. } => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
