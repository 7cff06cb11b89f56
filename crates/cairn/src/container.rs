//! Binary containers of the HTTP surface: the query-result container
//! (a root block listing claim and shard-index links, followed by the
//! member blocks) and the claim-ingest envelope.

use indexer::WalkResult;
use models::codec;
use models::{Cid, Claim, Error, DAG_CBOR};

const VERSION: u64 = 1;

/// A decoded query-result container: members keyed by their links, in
/// root order.
#[derive(Debug, Default, PartialEq)]
pub struct QueryResults {
    pub claims: Vec<(Cid, Vec<u8>)>,
    pub indexes: Vec<(Cid, Vec<u8>)>,
}

/// Serialize a walk result. The root block lists claim links then
/// index links; each member block carries its link and bytes, in root
/// order.
pub fn encode_results(result: &WalkResult) -> Vec<u8> {
    let claims: Vec<(Cid, Vec<u8>)> = result
        .claims
        .iter()
        .map(|(cid, claim)| (cid.clone(), claim.to_bytes()))
        .collect();
    let indexes: Vec<(Cid, Vec<u8>)> = result
        .indexes
        .values()
        .map(|index| {
            let archive = index.to_archive();
            (Cid::from_block(DAG_CBOR, &archive), archive)
        })
        .collect();

    let mut root = Vec::new();
    codec::write_uvarint(&mut root, claims.len() as u64);
    for (cid, _) in &claims {
        cid.write(&mut root);
    }
    codec::write_uvarint(&mut root, indexes.len() as u64);
    for (cid, _) in &indexes {
        cid.write(&mut root);
    }

    let mut out = Vec::new();
    codec::write_uvarint(&mut out, VERSION);
    codec::write_bytes(&mut out, &root);
    for (cid, bytes) in claims.iter().chain(indexes.iter()) {
        let mut block = Vec::new();
        cid.write(&mut block);
        codec::write_bytes(&mut block, bytes);
        codec::write_bytes(&mut out, &block);
    }
    out
}

pub fn decode_results(bytes: &[u8]) -> Result<QueryResults, Error> {
    let mut input = bytes;

    let version = codec::read_uvarint(&mut input)?;
    if version != VERSION {
        return Err(Error::UnknownTag(version));
    }

    let mut root = codec::read_bytes(&mut input)?;
    let claim_count = codec::read_uvarint(&mut root)? as usize;
    let mut claim_links = Vec::with_capacity(claim_count.min(1024));
    for _ in 0..claim_count {
        claim_links.push(Cid::read(&mut root)?);
    }
    let index_count = codec::read_uvarint(&mut root)? as usize;
    let mut index_links = Vec::with_capacity(index_count.min(1024));
    for _ in 0..index_count {
        index_links.push(Cid::read(&mut root)?);
    }
    codec::expect_eof(root)?;

    let read_member = |expected: &Cid, input: &mut &[u8]| -> Result<Vec<u8>, Error> {
        let mut block = codec::read_bytes(input)?;
        let cid = Cid::read(&mut block)?;
        if &cid != expected {
            return Err(Error::InvalidField {
                field: "member block",
                detail: format!("link {cid} does not match root entry {expected}"),
            });
        }
        let bytes = codec::read_bytes(&mut block)?.to_vec();
        codec::expect_eof(block)?;
        Ok(bytes)
    };

    let mut results = QueryResults::default();
    for link in claim_links {
        let bytes = read_member(&link, &mut input)?;
        results.claims.push((link, bytes));
    }
    for link in index_links {
        let bytes = read_member(&link, &mut input)?;
        results.indexes.push((link, bytes));
    }
    codec::expect_eof(input)?;
    Ok(results)
}

/// Serialize claims into an ingest envelope.
pub fn encode_ingest(claims: &[Claim]) -> Vec<u8> {
    let mut out = Vec::new();
    codec::write_uvarint(&mut out, claims.len() as u64);
    for claim in claims {
        codec::write_bytes(&mut out, &claim.to_bytes());
    }
    out
}

/// Parse an ingest envelope into its claims.
pub fn decode_ingest(bytes: &[u8]) -> Result<Vec<Claim>, Error> {
    let mut input = bytes;
    let count = codec::read_uvarint(&mut input)? as usize;

    let mut claims = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        claims.push(Claim::from_bytes(codec::read_bytes(&mut input)?)?);
    }
    codec::expect_eof(input)?;
    Ok(claims)
}

#[cfg(test)]
mod test {
    use super::*;
    use blob_index::{Position, ShardIndex};
    use models::{ByteRange, Caveats, Did, Digest, LocationCaveats};
    use std::sync::Arc;

    fn location_claim(content: &[u8]) -> Claim {
        let digest = Digest::sha2_256(content);
        Claim {
            issuer: Did::new("did:key:zIssuer").unwrap(),
            audience: Did::new("did:web:cairn.network").unwrap(),
            caveats: Caveats::Location(LocationCaveats {
                location: vec![format!("https://u.example/{digest}").parse().unwrap()],
                content: digest,
                range: Some(ByteRange::new(0, Some(500))),
                shard: None,
            }),
            expiration: None,
            signature: vec![5; 64],
        }
    }

    #[test]
    fn test_results_round_trip() {
        let claim = location_claim(b"one");
        let other = location_claim(b"two");

        let content = Digest::sha2_256(b"root");
        let mut index = ShardIndex::new(content.clone());
        index.insert(
            Digest::sha2_256(b"shard"),
            content.clone(),
            Position {
                offset: 0,
                length: 64,
            },
        );

        let mut walked = WalkResult::default();
        walked
            .claims
            .insert(claim.content_id(), Arc::new(claim.clone()));
        walked
            .claims
            .insert(other.content_id(), Arc::new(other.clone()));
        walked.indexes.insert(content, Arc::new(index.clone()));

        let encoded = encode_results(&walked);
        let decoded = decode_results(&encoded).unwrap();

        assert_eq!(decoded.claims.len(), 2);
        assert_eq!(decoded.indexes.len(), 1);

        for (link, bytes) in &decoded.claims {
            let parsed = Claim::from_bytes(bytes).unwrap();
            assert_eq!(&parsed.content_id(), link);
        }
        let parsed = ShardIndex::from_archive(&decoded.indexes[0].1).unwrap();
        assert_eq!(parsed, index);
    }

    #[test]
    fn test_empty_results_encode() {
        let encoded = encode_results(&WalkResult::default());
        assert_eq!(decode_results(&encoded).unwrap(), QueryResults::default());
    }

    #[test]
    fn test_ingest_round_trip() {
        let claims = vec![location_claim(b"one"), location_claim(b"two")];
        let envelope = encode_ingest(&claims);
        assert_eq!(decode_ingest(&envelope).unwrap(), claims);

        assert!(decode_ingest(b"garbage envelope").is_err());
    }
}
