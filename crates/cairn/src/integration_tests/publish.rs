use super::harness::Harness;
use crate::container;
use blob_index::{Position, ShardIndex};
use models::{ByteRange, Claim, Digest};
use queue::{CacheProvidersHandler, JobHandler};
use stores::{AdvertStore as _, CacheResult, JobQueue, ProviderStore};

async fn ingest(harness: &Harness, claims: &[Claim]) -> serde_json::Value {
    let response = harness
        .http
        .post(harness.base_url.join("claims").unwrap())
        .body(container::encode_ingest(claims))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    response.json().await.unwrap()
}

#[tokio::test]
async fn test_publish_then_query() {
    let harness = Harness::start().await;
    let d4 = Digest::sha2_256(b"D4");
    let claim = harness.location_claim(&d4, Some(ByteRange::new(0, Some(128))));

    let receipts = ingest(&harness, std::slice::from_ref(&claim)).await;
    assert_eq!(receipts["receipts"][0]["ok"], true);
    assert_eq!(receipts["receipts"][0]["outcome"], "published");

    // The chain advanced and the head was announced.
    let head = harness.head().await;
    assert!(harness.advert_store.get_block(&head).await.unwrap().is_some());
    assert_eq!(*harness.world.announce_calls.lock().unwrap(), 1);

    // The query is served from the local cache: the stub indexer knows
    // nothing about D4, and is never asked.
    let calls_before = *harness.world.find_calls.lock().unwrap();
    let (status, results) = harness.query(&format!("multihash={d4}")).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(results.claims.len(), 1);
    assert_eq!(Claim::from_bytes(&results.claims[0].1).unwrap(), claim);
    assert_eq!(*harness.world.find_calls.lock().unwrap(), calls_before);

    // The raw claim is also served directly.
    let fetched = harness
        .http
        .get(
            harness
                .base_url
                .join(&format!("claim/{}", claim.content_id()))
                .unwrap(),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(fetched.status(), reqwest::StatusCode::OK);
    assert_eq!(fetched.bytes().await.unwrap().as_ref(), claim.to_bytes());
}

#[tokio::test]
async fn test_republish_is_already_advertised() {
    let harness = Harness::start().await;
    let digest = Digest::sha2_256(b"repeat");
    let claim = harness.location_claim(&digest, None);

    ingest(&harness, std::slice::from_ref(&claim)).await;
    let first_head = harness.head().await;

    let receipts = ingest(&harness, std::slice::from_ref(&claim)).await;
    assert_eq!(receipts["receipts"][0]["ok"], true);
    assert_eq!(receipts["receipts"][0]["outcome"], "already advertised");

    // The chain is unchanged after the first call.
    assert_eq!(harness.head().await, first_head);
}

#[tokio::test]
async fn test_ingest_index_claim_backfills_providers() {
    let harness = Harness::start().await;
    let root = Digest::sha2_256(b"root");
    let b1 = Digest::sha2_256(b"b1");
    let shard = Digest::sha2_256(b"shard");

    let mut index = ShardIndex::new(root.clone());
    index.insert(
        shard.clone(),
        root.clone(),
        Position {
            offset: 0,
            length: 100,
        },
    );
    index.insert(
        shard.clone(),
        b1.clone(),
        Position {
            offset: 100,
            length: 40,
        },
    );

    // Host the index blob, then ingest the index claim together with
    // the location claim of the index blob itself.
    let archive = index.to_archive();
    let index_cid = models::Cid::from_block(models::DAG_CBOR, &archive);
    let index_digest = index_cid.digest().clone();
    harness.world.add_blob(&index_digest, archive);

    let index_claim = Claim {
        caveats: models::Caveats::Index(models::IndexCaveats {
            content: root.clone(),
            index: index_cid,
        }),
        ..harness.location_claim(&root, None)
    };
    let blob_location = harness.location_claim(&index_digest, None);

    let receipts = ingest(&harness, &[index_claim, blob_location]).await;
    assert_eq!(receipts["receipts"][0]["ok"], true);
    assert_eq!(receipts["receipts"][1]["ok"], true);

    // Backfill jobs were enqueued for the slice digests in the index;
    // run them through the handler the poller would drive.
    let handler = CacheProvidersHandler::new(harness.providers.clone());
    let jobs = harness.backfill_queue.read(16).await.unwrap();
    assert!(!jobs.is_empty());
    for job in jobs {
        handler.handle(job.job).await.unwrap();
        harness.backfill_queue.delete(job.id).await.unwrap();
    }

    for digest in [&root, &b1] {
        match harness.providers.members(digest).await.unwrap() {
            CacheResult::Hit(records) => assert!(!records.is_empty()),
            other => panic!("expected cached providers for {digest}, got {other:?}"),
        }
    }

    // The shard digest is not a slice: it is left for its own location
    // record rather than inheriting the index blob's.
    assert_eq!(
        harness.providers.members(&shard).await.unwrap(),
        CacheResult::Miss
    );
}

#[tokio::test]
async fn test_ingest_rejects_malformed_envelope() {
    let harness = Harness::start().await;
    let response = harness
        .http
        .post(harness.base_url.join("claims").unwrap())
        .body(b"not an envelope".to_vec())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cid_passthrough() {
    let harness = Harness::start().await;
    let digest = Digest::sha2_256(b"findable");
    let claim = harness.location_claim(&digest, None);
    ingest(&harness, std::slice::from_ref(&claim)).await;

    let cid = models::Cid::new(models::RAW, digest.clone());
    let response = harness
        .http
        .get(harness.base_url.join(&format!("cid/{cid}")).unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let found: ipni::wire::FindResponse = response.json().await.unwrap();
    assert_eq!(found.multihash_results.len(), 1);
    assert_eq!(found.multihash_results[0].multihash, digest);
    let record = found.multihash_results[0].provider_results[0]
        .to_record()
        .unwrap();
    assert_eq!(record.provider, *harness.publisher.provider());

    // An unknown digest is a 404.
    let missing = models::Cid::new(models::RAW, Digest::sha2_256(b"missing"));
    let response = harness
        .http
        .get(harness.base_url.join(&format!("cid/{missing}")).unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}
