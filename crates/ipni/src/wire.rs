//! JSON wire shapes of the indexer's HTTP find surface. The same
//! shapes back the service's own `/cid/` passthrough responses.

use models::{Cid, ContextId, Digest, Metadata, ProviderInfo, ProviderRecord};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FindResponse {
    #[serde(rename = "MultihashResults")]
    pub multihash_results: Vec<MultihashResult>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MultihashResult {
    #[serde(rename = "Multihash")]
    pub multihash: Digest,
    #[serde(rename = "ProviderResults")]
    pub provider_results: Vec<ProviderResult>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProviderResult {
    /// Base64 context ID bytes.
    #[serde(rename = "ContextID")]
    pub context_id: String,
    /// Base64 metadata bytes; a tagged union identifying the claim kind.
    #[serde(rename = "Metadata")]
    pub metadata: String,
    #[serde(rename = "Provider")]
    pub provider: ProviderInfo,
}

impl ProviderResult {
    pub fn from_record(record: &ProviderRecord) -> Self {
        Self {
            context_id: base64::encode(record.context_id.as_bytes()),
            metadata: base64::encode(record.metadata.to_bytes()),
            provider: record.provider.clone(),
        }
    }

    /// Decode into a provider record. Unrecognized metadata tags fail
    /// with `UnknownTag`, which callers drop.
    pub fn to_record(&self) -> Result<ProviderRecord, models::Error> {
        let context_id = base64::decode(&self.context_id).map_err(|err| {
            models::Error::InvalidField {
                field: "context id",
                detail: err.to_string(),
            }
        })?;
        let metadata = base64::decode(&self.metadata).map_err(|err| {
            models::Error::InvalidField {
                field: "metadata",
                detail: err.to_string(),
            }
        })?;

        Ok(ProviderRecord {
            context_id: ContextId::from_bytes(context_id),
            metadata: Metadata::from_bytes(&metadata)?,
            provider: self.provider.clone(),
        })
    }
}

/// ProviderStatus is the indexer's record of a publishing peer,
/// including the head of its advertisement chain.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProviderStatus {
    #[serde(rename = "AddrInfo")]
    pub addr_info: ProviderInfo,
    #[serde(rename = "LastAdvertisement", default)]
    pub last_advertisement: Option<Cid>,
}

/// Announce is the body PUT to direct-announce endpoints after a head
/// update.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Announce {
    #[serde(rename = "Cid")]
    pub cid: Cid,
    #[serde(rename = "Addrs")]
    pub addresses: Vec<url::Url>,
}
