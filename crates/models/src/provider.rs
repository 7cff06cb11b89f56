use crate::{ContextId, Metadata};

/// ProviderInfo identifies a peer serving content, along with the
/// addresses at which it can be reached.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ProviderInfo {
    #[serde(rename = "ID")]
    pub peer: String,
    #[serde(rename = "Addrs")]
    pub addresses: Vec<url::Url>,
}

impl ProviderInfo {
    /// The endpoint from which the provider's signed claims are fetched,
    /// derived from its first address.
    pub fn claims_endpoint(&self) -> Option<url::Url> {
        self.addresses.first()?.join("claims/").ok()
    }
}

/// ProviderRecord is one provider's entry for a digest: the context it
/// was advertised under, the decoded claim-kind metadata, and the
/// provider itself. Records with unrecognized metadata tags are dropped
/// before construction, so `metadata` is always a known kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderRecord {
    pub context_id: ContextId,
    pub metadata: Metadata,
    pub provider: ProviderInfo,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_claims_endpoint() {
        let provider = ProviderInfo {
            peer: "12D3KooWExample".to_string(),
            addresses: vec!["https://node.example/".parse().unwrap()],
        };
        assert_eq!(
            provider.claims_endpoint().unwrap().as_str(),
            "https://node.example/claims/"
        );

        let unreachable = ProviderInfo {
            peer: "12D3KooWExample".to_string(),
            addresses: Vec::new(),
        };
        assert!(unreachable.claims_endpoint().is_none());
    }
}
