use super::harness::Harness;
use models::{ContextId, Digest};
use publisher::{HeadNotifier, NotifierConfig, SyncConsumer};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_remote_sync_invalidates_cached_empty() {
    let harness = Harness::start().await;
    let d3 = Digest::sha2_256(b"D3");

    // First query misses everywhere and caches the empty result.
    let (status, results) = harness.query(&format!("multihash={d3}")).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert!(results.claims.is_empty());
    let calls_after_miss = *harness.world.find_calls.lock().unwrap();

    // A repeat query is answered by the cached empty.
    let (_, results) = harness.query(&format!("multihash={d3}")).await;
    assert!(results.claims.is_empty());
    assert_eq!(*harness.world.find_calls.lock().unwrap(), calls_after_miss);

    // The world moves on: the indexer learns a location for D3, and
    // the watched provider's chain gains an advert listing D3.
    let seeded = harness.seed_location(&d3, None);
    harness
        .publisher
        .publish(&ContextId::from_digest(&d3), b"meta", &[d3.clone()])
        .await
        .unwrap();

    // Without a sync, the stale cached empty still wins.
    let (_, results) = harness.query(&format!("multihash={d3}")).await;
    assert!(results.claims.is_empty());

    // The consumer walks the new chain segment and evicts D3.
    harness
        .consumer
        .handle(harness.head().await, None)
        .await
        .unwrap();

    let (status, results) = harness.query(&format!("multihash={d3}")).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(results.claims.len(), 1);
    assert_eq!(
        models::Claim::from_bytes(&results.claims[0].1).unwrap(),
        seeded
    );
    assert!(*harness.world.find_calls.lock().unwrap() > calls_after_miss);
}

#[tokio::test]
async fn test_notifier_drives_the_consumer() {
    let harness = Harness::start().await;
    let digest = Digest::sha2_256(b"watched");

    // Cache an empty result, then advance the remote chain.
    let (_, results) = harness.query(&format!("multihash={digest}")).await;
    assert!(results.claims.is_empty());

    harness.seed_location(&digest, None);
    harness
        .publisher
        .publish(&ContextId::from_digest(&digest), b"meta", &[digest.clone()])
        .await
        .unwrap();
    harness.world.set_head(harness.head().await);

    // A notifier polling the stub indexer should observe the head and
    // run the consumer, evicting the cached empty.
    let mut notifier = HeadNotifier::new(
        harness.ini.clone(),
        "zRemotePublisher".to_string(),
        NotifierConfig {
            interval: Duration::from_millis(25),
            staleness: Duration::from_secs(3600),
        },
    );
    let consumer = Arc::new(SyncConsumer::new(
        harness.advert_store.clone(),
        harness.providers.clone(),
    ));
    notifier.notify(Box::new(move |head, previous| {
        let consumer = consumer.clone();
        Box::pin(async move {
            consumer.handle(head, previous).await.unwrap();
        })
    }));

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let running = tokio::spawn(notifier.run(async move {
        let _ = stop_rx.await;
    }));

    // Wait for the sync to land: the follow-up query stops hitting the
    // cached empty and returns the new claim.
    let mut found = false;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let (_, results) = harness.query(&format!("multihash={digest}")).await;
        if !results.claims.is_empty() {
            found = true;
            break;
        }
    }
    let _ = stop_tx.send(());
    running.await.unwrap();

    assert!(found, "notifier never drove the consumer to invalidate");
}
