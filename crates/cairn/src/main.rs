use anyhow::Context;
use cairn::api;
use clap::Parser;
use futures::FutureExt;
use indexer::{BlobIndexLookup, ClaimLookup, NoLegacy, ProviderIndex, QueryWalker};
use publisher::{HeadNotifier, NotifierConfig, Publisher, PublisherConfig, SyncConsumer};
use queue::{CacheProvidersHandler, Poller, PollerConfig};
use std::sync::Arc;
use std::time::Duration;
use stores::{
    MemoryAdvertStore, MemoryClaimStore, MemoryContextTable, MemoryJobQueue, MemoryProviderStore,
    MemoryShardIndexStore, ProviderStoreConfig,
};

/// Cairn is a content-addressable indexing service: it resolves digests
/// to signed content claims and shard indexes, and publishes what it
/// learns to an interplanetary network indexer.
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// The port to listen on for API requests.
    #[clap(long, default_value = "8080", env = "PORT")]
    port: u16,
    /// Public base URL at which this service is reachable.
    #[clap(
        long = "public-url",
        env = "PUBLIC_URL",
        default_value = "http://127.0.0.1:8080/"
    )]
    public_url: url::Url,
    /// The service's decentralized identifier.
    #[clap(long = "service-did", env = "SERVICE_DID", default_value = "did:web:cairn.local")]
    service_did: String,
    /// Find endpoint of the remote network indexer.
    #[clap(
        long = "ipni-find-url",
        env = "IPNI_FIND_URL",
        default_value = "https://indexer.cairn.local/"
    )]
    ipni_find_url: url::Url,
    /// Direct-announce endpoints notified of new chain heads.
    /// May be specified multiple times.
    #[clap(long = "announce-url", env = "IPNI_ANNOUNCE_URL")]
    announce_urls: Vec<url::Url>,
    /// Topic of the advertisement chain.
    #[clap(
        long = "ipni-topic",
        env = "IPNI_TOPIC",
        default_value = "/indexer/ingest/mainnet"
    )]
    topic: String,
    /// Base64 ed25519 signing key. An ephemeral key is generated when
    /// absent, which is only suitable for local stacks.
    #[clap(long = "signing-key", env = "SIGNING_KEY", hide_env_values = true)]
    signing_key: Option<String>,
    /// Peer whose remote advert chain head is watched for cache sync.
    #[clap(long = "watch-peer", env = "WATCH_PEER")]
    watch_peer: Option<String>,
    /// Interval between remote head polls.
    #[clap(
        long = "notify-interval",
        env = "NOTIFY_INTERVAL",
        default_value = "30s",
        value_parser = humantime::parse_duration
    )]
    notify_interval: Duration,
    /// Warn when the remote head has not advanced for this long.
    #[clap(
        long = "notify-staleness",
        env = "NOTIFY_STALENESS",
        default_value = "1h",
        value_parser = humantime::parse_duration
    )]
    notify_staleness: Duration,
    /// Concurrent lookups per query walk.
    #[clap(long = "walker-concurrency", env = "WALKER_CONCURRENCY", default_value = "5")]
    walker_concurrency: usize,
    /// Concurrent provider-cacher jobs.
    #[clap(long = "cacher-concurrency", env = "CACHER_CONCURRENCY", default_value = "100")]
    cacher_concurrency: usize,
    /// Backfill queue capacity; writers are refused beyond it.
    #[clap(long = "queue-capacity", env = "QUEUE_CAPACITY", default_value = "100000")]
    queue_capacity: usize,
    /// TTL of cached provider records.
    #[clap(
        long = "provider-cache-ttl",
        env = "PROVIDER_CACHE_TTL",
        default_value = "30m",
        value_parser = humantime::parse_duration
    )]
    provider_cache_ttl: Duration,
    /// TTL of cached empty results.
    #[clap(
        long = "negative-cache-ttl",
        env = "NEGATIVE_CACHE_TTL",
        default_value = "5m",
        value_parser = humantime::parse_duration
    )]
    negative_cache_ttl: Duration,
}

fn main() -> Result<(), anyhow::Error> {
    // Use reasonable defaults for printing structured logs to stderr.
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting tracing default failed");

    let args = Args::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let task = runtime.spawn(async move { async_main(args).await });
    let result = runtime.block_on(task);

    tracing::info!(?result, "main function completed, shutting down runtime");
    runtime.shutdown_timeout(std::time::Duration::from_secs(5));
    result?
}

async fn async_main(args: Args) -> Result<(), anyhow::Error> {
    // Bind early in the application lifecycle, to not fail requests
    // which may dispatch as soon as the process is up.
    let api_listener = tokio::net::TcpListener::bind(format!("[::]:{}", args.port))
        .await
        .context("failed to bind server port")?;

    tracing::info!(
        port = args.port,
        public_url = %args.public_url,
        ipni_find_url = %args.ipni_find_url,
        topic = %args.topic,
        "started!"
    );

    let keypair = match &args.signing_key {
        Some(encoded) => ipni::Keypair::from_base64(encoded)
            .map_err(|err| anyhow::anyhow!("parsing --signing-key: {err}"))?,
        None => {
            tracing::warn!("no signing key configured; generated an ephemeral identity");
            ipni::Keypair::generate()
        }
    };
    let did: models::Did = args.service_did.parse().context("parsing --service-did")?;
    let provider_info = models::ProviderInfo {
        peer: keypair.peer_id(),
        addresses: vec![args.public_url.clone()],
    };

    let http = reqwest::Client::builder()
        .user_agent(concat!("cairn/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("building http client")?;
    let ini = ipni::Client::new(http.clone(), args.ipni_find_url.clone());

    // Backing stores. Every one is a capability seam; the in-memory
    // implementations serve single-node deployments and local stacks.
    let provider_store = Arc::new(MemoryProviderStore::new(ProviderStoreConfig {
        record_ttl: args.provider_cache_ttl,
        empty_ttl: args.negative_cache_ttl,
        ..Default::default()
    }));
    let shard_store = Arc::new(MemoryShardIndexStore::default());
    let claim_store = Arc::new(MemoryClaimStore::default());
    let advert_store = Arc::new(MemoryAdvertStore::default());
    let backfill_queue = Arc::new(MemoryJobQueue::new(args.queue_capacity));

    let publisher = Arc::new(Publisher::new(
        keypair.clone(),
        provider_info.clone(),
        advert_store.clone(),
        Arc::new(MemoryContextTable::default()),
        Arc::new(MemoryContextTable::default()),
        ini.clone(),
        PublisherConfig {
            topic: args.topic.clone(),
            announce_urls: args.announce_urls.clone(),
        },
    ));

    let provider_index = Arc::new(ProviderIndex::new(
        provider_store.clone(),
        ini.clone(),
        Arc::new(NoLegacy),
        publisher.clone(),
    ));
    let claim_lookup = Arc::new(ClaimLookup::new(claim_store.clone(), http.clone()));
    let blob_lookup = Arc::new(BlobIndexLookup::new(
        shard_store.clone(),
        backfill_queue.clone(),
        http.clone(),
    ));
    let walker = QueryWalker::new(
        provider_index.clone(),
        claim_lookup,
        blob_lookup.clone(),
        args.walker_concurrency,
    );

    // Share-able future which completes when the service should exit.
    let shutdown = tokio::signal::ctrl_c().map(|_| ()).shared();

    // Wire up the API server.
    let app = Arc::new(api::App {
        did,
        public_key: keypair.public_bytes(),
        provider_info,
        provider_index,
        walker,
        claims: claim_store,
        blobs: blob_lookup,
    });
    let api_server =
        axum::serve(api_listener, api::build_router(app)).with_graceful_shutdown(shutdown.clone());
    let api_server = async move { anyhow::Result::Ok(api_server.await?) };

    // Wire up the provider-cacher poller.
    let poller = Poller::new(
        backfill_queue,
        Arc::new(CacheProvidersHandler::new(provider_store.clone())),
        PollerConfig {
            concurrency: args.cacher_concurrency,
            ..Default::default()
        },
    );
    let poller = poller.serve(shutdown.clone()).map(anyhow::Result::Ok);

    // Wire up the remote-sync notifier, when a peer is watched.
    let notifier: futures::future::BoxFuture<'_, anyhow::Result<()>> = match &args.watch_peer {
        Some(peer) => {
            let mut notifier = HeadNotifier::new(
                ini,
                peer.clone(),
                NotifierConfig {
                    interval: args.notify_interval,
                    staleness: args.notify_staleness,
                },
            );
            let consumer = Arc::new(SyncConsumer::new(advert_store, provider_store));
            notifier.notify(Box::new(move |head, previous| {
                let consumer = consumer.clone();
                Box::pin(async move {
                    if let Err(err) = consumer.handle(head, previous).await {
                        tracing::error!(?err, "remote sync failed");
                    }
                })
            }));
            notifier.run(shutdown).map(anyhow::Result::Ok).boxed()
        }
        None => futures::future::ready(anyhow::Result::Ok(())).boxed(),
    };

    let ((), (), ()) = tokio::try_join!(api_server, poller, notifier)?;

    Ok(())
}
