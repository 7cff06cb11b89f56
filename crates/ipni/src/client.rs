use crate::{wire, Error, Result};
use models::Digest;

/// Client speaks the indexer's HTTP find surface: digest lookups,
/// provider-info reads, and direct announcements of new chain heads.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    find_url: url::Url,
}

impl Client {
    pub fn new(http: reqwest::Client, find_url: url::Url) -> Self {
        Self { http, find_url }
    }

    /// Look up provider results for a digest. An indexer 404 means the
    /// digest is unknown and resolves to an empty result.
    pub async fn find(&self, digest: &Digest) -> Result<Vec<wire::ProviderResult>> {
        let url = self
            .find_url
            .join(&format!("multihash/{digest}"))
            .map_err(|_| Error::InvalidEndpoint(self.find_url.to_string()))?;

        let response = self.http.get(url).send().await.map_err(Error::Fetch)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(Error::Status(response.status()));
        }

        let found: wire::FindResponse = response.json().await.map_err(Error::DecodeResponse)?;
        tracing::trace!(%digest, results = found.multihash_results.len(), "indexer find");

        Ok(found
            .multihash_results
            .into_iter()
            .flat_map(|result| result.provider_results)
            .collect())
    }

    /// Read the indexer's provider record for a publishing peer,
    /// including its last advertisement link.
    pub async fn provider_info(&self, peer: &str) -> Result<wire::ProviderStatus> {
        let url = self
            .find_url
            .join(&format!("providers/{peer}"))
            .map_err(|_| Error::InvalidEndpoint(self.find_url.to_string()))?;

        let response = self.http.get(url).send().await.map_err(Error::Fetch)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound);
        }
        if !response.status().is_success() {
            return Err(Error::Status(response.status()));
        }
        response.json().await.map_err(Error::DecodeResponse)
    }

    /// Announce a new chain head to a direct-announce endpoint.
    pub async fn announce(
        &self,
        announce_url: &url::Url,
        announce: &wire::Announce,
    ) -> Result<()> {
        let response = self
            .http
            .put(announce_url.clone())
            .json(announce)
            .send()
            .await
            .map_err(Error::Fetch)?;

        if !response.status().is_success() {
            return Err(Error::Status(response.status()));
        }
        Ok(())
    }
}
