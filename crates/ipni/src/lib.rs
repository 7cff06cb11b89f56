//! Client and wire schema for the interplanetary network indexer (INI):
//! find queries and provider-info reads over HTTP, plus the signed
//! advertisement chain format remote indexer nodes sync from us.

mod client;
pub use client::Client;

pub mod key;
pub use key::Keypair;

mod schema;
pub use schema::{Advertisement, EntriesChunk, SignedHead, MAX_CHUNK_ENTRIES};

pub mod wire;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid indexer endpoint: '{0}'")]
    InvalidEndpoint(String),
    #[error("not found")]
    NotFound,
    #[error("failed to fetch from indexer")]
    Fetch(#[source] reqwest::Error),
    #[error("indexer returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("failed to decode indexer response")]
    DecodeResponse(#[source] reqwest::Error),
    #[error("failed to decode wire value")]
    Decode(#[from] models::Error),
    #[error("invalid signing key material")]
    InvalidKey,
    #[error("signature verification failed")]
    BadSignature,
    #[error("signer {signer} does not match provider {provider}")]
    SignerMismatch { signer: String, provider: String },
}

impl Error {
    /// Whether a retry may succeed: network faults and upstream non-2xx.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Fetch(_) | Self::Status(_) | Self::DecodeResponse(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
