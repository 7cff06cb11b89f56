use crate::{Error, Result};
use models::{Cid, Claim, Digest, ProviderInfo};
use std::sync::Arc;
use std::time::Duration;
use stores::ClaimStore;

/// How long a failed claim fetch suppresses re-fetching.
const NEGATIVE_TTL: Duration = Duration::from_secs(60);

/// ClaimLookup resolves a content identifier to the full signed claim:
/// local store first, then the provider's claim endpoint. Fetched bytes
/// must hash to the requested content id, so a successful fetch is also
/// a successful verification that this is the claim the provider
/// advertised.
pub struct ClaimLookup {
    store: Arc<dyn ClaimStore>,
    http: reqwest::Client,
    negative: moka::future::Cache<Vec<u8>, ()>,
}

impl ClaimLookup {
    pub fn new(store: Arc<dyn ClaimStore>, http: reqwest::Client) -> Self {
        Self {
            store,
            http,
            negative: moka::future::Cache::builder()
                .max_capacity(1 << 16)
                .time_to_live(NEGATIVE_TTL)
                .build(),
        }
    }

    /// Fetch the claim named by `cid`, consulting `provider` on a local
    /// miss. Returns `None` when the provider does not have it either.
    pub async fn get(&self, cid: &Cid, provider: &ProviderInfo) -> Result<Option<Arc<Claim>>> {
        if let Some(claim) = self.store.get(cid).await? {
            return Ok(Some(claim));
        }
        if self.negative.get(&cid.to_bytes()).await.is_some() {
            return Ok(None);
        }

        let Some(claim) = self.fetch(cid, provider).await? else {
            self.negative.insert(cid.to_bytes(), ()).await;
            return Ok(None);
        };

        self.store.put(cid.clone(), claim.clone()).await?;
        Ok(Some(claim))
    }

    async fn fetch(&self, cid: &Cid, provider: &ProviderInfo) -> Result<Option<Arc<Claim>>> {
        let Some(endpoint) = provider.claims_endpoint() else {
            tracing::debug!(peer = %provider.peer, "provider has no claims endpoint");
            return Ok(None);
        };
        let Ok(url) = endpoint.join(&cid.to_string()) else {
            tracing::debug!(peer = %provider.peer, "provider claims endpoint is malformed");
            return Ok(None);
        };

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| Error::Fetch {
                what: "claim",
                source,
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::Status {
                what: "claim",
                status: response.status(),
            });
        }

        let bytes = response.bytes().await.map_err(|source| Error::Fetch {
            what: "claim",
            source,
        })?;

        // The claim id is the hash of its canonical bytes: checking the
        // hash and verifying provenance are the same act.
        let computed = Digest::sha2_256(&bytes);
        if &computed != cid.digest() {
            return Err(Error::ClaimHashMismatch { cid: cid.clone() });
        }

        let claim = Claim::from_bytes(&bytes).map_err(Error::DecodeClaim)?;
        Ok(Some(Arc::new(claim)))
    }
}
