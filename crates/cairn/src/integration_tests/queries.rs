use super::harness::Harness;
use blob_index::{Position, ShardIndex};
use models::{ByteRange, Capability, Claim, Digest};
use queue::{CacheProvidersHandler, JobHandler};
use stores::JobQueue;

fn decoded_claims(results: &crate::container::QueryResults) -> Vec<Claim> {
    results
        .claims
        .iter()
        .map(|(link, bytes)| {
            let claim = Claim::from_bytes(bytes).unwrap();
            assert_eq!(&claim.content_id(), link);
            claim
        })
        .collect()
}

#[tokio::test]
async fn test_simple_location_lookup() {
    let harness = Harness::start().await;
    let d1 = Digest::sha2_256(b"D1");
    let seeded = harness.seed_location(&d1, Some(ByteRange::new(0, Some(500))));

    let (status, results) = harness.query(&format!("multihash={d1}&type=standard")).await;
    assert_eq!(status, reqwest::StatusCode::OK);

    let claims = decoded_claims(&results);
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0], seeded);
    assert_eq!(claims[0].capability(), Capability::Location);
    assert_eq!(claims[0].content(), &d1);
    assert!(results.indexes.is_empty());

    // A second query is served from the provider cache.
    let calls_before = *harness.world.find_calls.lock().unwrap();
    let (status, results) = harness.query(&format!("multihash={d1}")).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(results.claims.len(), 1);
    assert_eq!(*harness.world.find_calls.lock().unwrap(), calls_before);
}

#[tokio::test]
async fn test_index_fan_out() {
    let harness = Harness::start().await;
    let root = Digest::sha2_256(b"R");
    let s1 = Digest::sha2_256(b"S1");
    let s2 = Digest::sha2_256(b"S2");

    let mut index = ShardIndex::new(root.clone());
    index.insert(
        s1.clone(),
        root.clone(),
        Position {
            offset: 0,
            length: 100,
        },
    );
    index.insert(
        s1.clone(),
        Digest::sha2_256(b"b1"),
        Position {
            offset: 100,
            length: 100,
        },
    );
    index.insert(
        s2.clone(),
        Digest::sha2_256(b"b2"),
        Position {
            offset: 0,
            length: 50,
        },
    );

    harness.seed_index(&root, &index);
    harness.seed_location(&s1, None);
    harness.seed_location(&s2, None);

    let (status, results) = harness.query(&format!("multihash={root}")).await;
    assert_eq!(status, reqwest::StatusCode::OK);

    // One shard index came back, byte-identical to what was hosted.
    assert_eq!(results.indexes.len(), 1);
    let fetched = ShardIndex::from_archive(&results.indexes[0].1).unwrap();
    assert_eq!(fetched, index);

    // Claims: the index claim for R, the index blob's location, and
    // locations for both shards.
    let mut kinds: Vec<Capability> = decoded_claims(&results)
        .iter()
        .map(Claim::capability)
        .collect();
    kinds.sort_by_key(|kind| kind.as_str().to_string());
    assert_eq!(
        kinds,
        vec![
            Capability::Index,
            Capability::Location,
            Capability::Location,
            Capability::Location,
        ]
    );

    // Fetching the index queued backfill work for its digests.
    assert!(!harness.backfill_queue.is_empty());
}

#[tokio::test]
async fn test_shard_lookups_stay_authoritative_after_backfill() {
    let harness = Harness::start().await;
    let root = Digest::sha2_256(b"R");
    let s1 = Digest::sha2_256(b"S1");
    let s2 = Digest::sha2_256(b"S2");

    let mut index = ShardIndex::new(root.clone());
    index.insert(
        s1.clone(),
        root.clone(),
        Position {
            offset: 0,
            length: 100,
        },
    );
    index.insert(
        s2.clone(),
        Digest::sha2_256(b"b2"),
        Position {
            offset: 0,
            length: 50,
        },
    );

    harness.seed_index(&root, &index);
    let s1_claim = harness.seed_location(&s1, None);
    harness.seed_location(&s2, None);

    let (status, _) = harness.query(&format!("multihash={root}")).await;
    assert_eq!(status, reqwest::StatusCode::OK);

    // Drain the backfill the poller would process continuously in
    // production.
    let handler = CacheProvidersHandler::new(harness.providers.clone());
    while !harness.backfill_queue.is_empty() {
        for job in harness.backfill_queue.read(16).await.unwrap() {
            handler.handle(job.job).await.unwrap();
            harness.backfill_queue.delete(job.id).await.unwrap();
        }
    }

    // A direct query for the shard digest still resolves to exactly
    // the shard's own location claim. Backfilling must not shadow it
    // with the index blob's record.
    let (status, results) = harness.query(&format!("multihash={s1}")).await;
    assert_eq!(status, reqwest::StatusCode::OK);

    let claims = decoded_claims(&results);
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0], s1_claim);
    assert_eq!(claims[0].content(), &s1);
}

#[tokio::test]
async fn test_equals_chasing() {
    let harness = Harness::start().await;
    let d1 = Digest::sha2_256(b"D1");
    let d2 = Digest::sha2_256(b"D2");

    harness.seed_equals(&d1, &d2);
    harness.seed_location(&d2, None);

    let (status, results) = harness.query(&format!("multihash={d1}")).await;
    assert_eq!(status, reqwest::StatusCode::OK);

    let mut kinds: Vec<Capability> = decoded_claims(&results)
        .iter()
        .map(Claim::capability)
        .collect();
    kinds.sort_by_key(|kind| kind.as_str().to_string());
    assert_eq!(kinds, vec![Capability::Equals, Capability::Location]);
}

#[tokio::test]
async fn test_empty_result_is_200() {
    let harness = Harness::start().await;
    let unknown = Digest::sha2_256(b"never stored");

    let (status, results) = harness.query(&format!("multihash={unknown}")).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert!(results.claims.is_empty());
    assert!(results.indexes.is_empty());
}

#[tokio::test]
async fn test_malformed_query_is_400() {
    let harness = Harness::start().await;

    for params in ["", "multihash=n0t-a-digest!!", "multihash=zz&type=bogus"] {
        let (status, _) = harness.query(params).await;
        assert_eq!(status, reqwest::StatusCode::BAD_REQUEST, "params: {params}");
    }
}

#[tokio::test]
async fn test_banner_and_did_document() {
    let harness = Harness::start().await;

    let banner = harness
        .http
        .get(harness.base_url.clone())
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(banner.contains("cairn v"));

    let document: serde_json::Value = harness
        .http
        .get(harness.base_url.join(".well-known/did.json").unwrap())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(document["id"], "did:web:cairn.test");
}
