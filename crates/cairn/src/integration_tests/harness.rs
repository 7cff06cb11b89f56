//! A full service stack over in-memory stores, fronted by a live HTTP
//! listener, with a stub network indexer + storage node standing in for
//! the world outside.

use crate::api;
use axum::extract::{Path, State};
use axum::routing::{get, put};
use indexer::{BlobIndexLookup, ClaimLookup, NoLegacy, ProviderIndex, QueryWalker};
use ipni::wire;
use models::{
    ByteRange, Caveats, Cid, Claim, ContextId, Did, Digest, EqualsCaveats, IndexCaveats,
    LocationCaveats, Metadata, ProviderInfo, ProviderRecord, DAG_CBOR,
};
use publisher::{Publisher, PublisherConfig, SyncConsumer};
use queue::CacheProvidersJob;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use stores::{
    AdvertStore as _, MemoryAdvertStore, MemoryClaimStore, MemoryContextTable, MemoryJobQueue,
    MemoryProviderStore, MemoryShardIndexStore,
};

/// StubWorld plays the remote indexer and a storage node: find and
/// provider-info lookups, claim fetches, blob fetches, and announce.
#[derive(Clone, Default)]
pub struct StubWorld {
    records: Arc<Mutex<HashMap<String, Vec<wire::ProviderResult>>>>,
    claims: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    head: Arc<Mutex<Option<Cid>>>,
    pub find_calls: Arc<Mutex<usize>>,
    pub announce_calls: Arc<Mutex<usize>>,
}

impl StubWorld {
    pub async fn serve(&self) -> url::Url {
        let router = axum::Router::new()
            .route("/multihash/:digest", get(stub_find))
            .route("/providers/:peer", get(stub_provider_info))
            .route("/claims/:cid", get(stub_claim))
            .route("/blob/:digest", get(stub_blob))
            .route("/announce", put(stub_announce))
            .with_state(self.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://127.0.0.1:{port}/").parse().unwrap()
    }

    pub fn set_head(&self, head: Cid) {
        *self.head.lock().unwrap() = Some(head);
    }

    pub fn add_record(&self, digest: &Digest, record: &ProviderRecord) {
        self.records
            .lock()
            .unwrap()
            .entry(digest.to_string())
            .or_default()
            .push(wire::ProviderResult::from_record(record));
    }

    pub fn add_claim(&self, claim: &Claim) {
        self.claims
            .lock()
            .unwrap()
            .insert(claim.content_id().to_string(), claim.to_bytes());
    }

    pub fn add_blob(&self, digest: &Digest, bytes: Vec<u8>) {
        self.blobs.lock().unwrap().insert(digest.to_string(), bytes);
    }
}

async fn stub_find(
    State(stub): State<StubWorld>,
    Path(digest): Path<String>,
) -> axum::response::Response {
    use axum::response::IntoResponse;
    *stub.find_calls.lock().unwrap() += 1;

    let records = stub.records.lock().unwrap().get(&digest).cloned();
    match records {
        Some(provider_results) if !provider_results.is_empty() => {
            let multihash: Digest = digest.parse().unwrap();
            axum::Json(wire::FindResponse {
                multihash_results: vec![wire::MultihashResult {
                    multihash,
                    provider_results,
                }],
            })
            .into_response()
        }
        _ => axum::http::StatusCode::NOT_FOUND.into_response(),
    }
}

async fn stub_provider_info(
    State(stub): State<StubWorld>,
    Path(peer): Path<String>,
) -> axum::Json<wire::ProviderStatus> {
    axum::Json(wire::ProviderStatus {
        addr_info: ProviderInfo {
            peer,
            addresses: Vec::new(),
        },
        last_advertisement: stub.head.lock().unwrap().clone(),
    })
}

async fn stub_claim(
    State(stub): State<StubWorld>,
    Path(cid): Path<String>,
) -> axum::response::Response {
    use axum::response::IntoResponse;
    match stub.claims.lock().unwrap().get(&cid) {
        Some(bytes) => bytes.clone().into_response(),
        None => axum::http::StatusCode::NOT_FOUND.into_response(),
    }
}

async fn stub_blob(
    State(stub): State<StubWorld>,
    Path(digest): Path<String>,
) -> axum::response::Response {
    use axum::response::IntoResponse;
    match stub.blobs.lock().unwrap().get(&digest) {
        Some(bytes) => bytes.clone().into_response(),
        None => axum::http::StatusCode::NOT_FOUND.into_response(),
    }
}

async fn stub_announce(State(stub): State<StubWorld>) -> axum::http::StatusCode {
    *stub.announce_calls.lock().unwrap() += 1;
    axum::http::StatusCode::OK
}

/// Harness is the wired service plus handles into its internals.
pub struct Harness {
    pub world: StubWorld,
    pub world_url: url::Url,
    pub base_url: url::Url,
    pub http: reqwest::Client,
    pub ini: ipni::Client,
    pub providers: Arc<MemoryProviderStore>,
    pub advert_store: Arc<MemoryAdvertStore>,
    pub backfill_queue: Arc<MemoryJobQueue<CacheProvidersJob>>,
    pub publisher: Arc<Publisher>,
    pub consumer: SyncConsumer,
}

impl Harness {
    pub async fn start() -> Self {
        let world = StubWorld::default();
        let world_url = world.serve().await;

        let http = reqwest::Client::new();
        let ini = ipni::Client::new(http.clone(), world_url.clone());

        let keypair = ipni::Keypair::generate();
        let provider_info = ProviderInfo {
            peer: keypair.peer_id(),
            addresses: vec![world_url.clone()],
        };

        let providers = Arc::new(MemoryProviderStore::default());
        let shard_store = Arc::new(MemoryShardIndexStore::default());
        let claim_store = Arc::new(MemoryClaimStore::default());
        let advert_store = Arc::new(MemoryAdvertStore::default());
        let backfill_queue = Arc::new(MemoryJobQueue::new(1024));

        let publisher = Arc::new(Publisher::new(
            keypair.clone(),
            provider_info.clone(),
            advert_store.clone(),
            Arc::new(MemoryContextTable::default()),
            Arc::new(MemoryContextTable::default()),
            ini.clone(),
            PublisherConfig {
                topic: "/indexer/ingest/testnet".to_string(),
                announce_urls: vec![world_url.join("announce").unwrap()],
            },
        ));

        let provider_index = Arc::new(ProviderIndex::new(
            providers.clone(),
            ini.clone(),
            Arc::new(NoLegacy),
            publisher.clone(),
        ));
        let blob_lookup = Arc::new(BlobIndexLookup::new(
            shard_store,
            backfill_queue.clone(),
            http.clone(),
        ));
        let walker = QueryWalker::new(
            provider_index.clone(),
            Arc::new(ClaimLookup::new(claim_store.clone(), http.clone())),
            blob_lookup.clone(),
            5,
        );

        let app = Arc::new(api::App {
            did: Did::new("did:web:cairn.test").unwrap(),
            public_key: keypair.public_bytes(),
            provider_info,
            provider_index,
            walker,
            claims: claim_store,
            blobs: blob_lookup,
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let router = api::build_router(app);
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let consumer = SyncConsumer::new(advert_store.clone(), providers.clone());

        Self {
            world,
            world_url,
            base_url: format!("http://127.0.0.1:{port}/").parse().unwrap(),
            http,
            ini,
            providers,
            advert_store,
            backfill_queue,
            publisher,
            consumer,
        }
    }

    /// The storage node identity records in the stub world carry.
    pub fn storage_provider(&self) -> ProviderInfo {
        ProviderInfo {
            peer: "zStorageNode".to_string(),
            addresses: vec![self.world_url.clone()],
        }
    }

    /// Seed a location claim (and its provider record) for `digest`.
    pub fn seed_location(&self, digest: &Digest, range: Option<ByteRange>) -> Claim {
        let claim = self.location_claim(digest, range);
        let record = ProviderRecord {
            context_id: ContextId::from_digest(digest),
            metadata: Metadata::Location {
                claim: claim.content_id(),
                range,
                shard: None,
                expiration: None,
            },
            provider: self.storage_provider(),
        };
        self.world.add_claim(&claim);
        self.world.add_record(digest, &record);
        claim
    }

    pub fn location_claim(&self, digest: &Digest, range: Option<ByteRange>) -> Claim {
        Claim {
            issuer: Did::new("did:key:zStorageNode").unwrap(),
            audience: Did::new("did:web:cairn.test").unwrap(),
            caveats: Caveats::Location(LocationCaveats {
                content: digest.clone(),
                location: vec![self
                    .world_url
                    .join(&format!("blob/{digest}"))
                    .unwrap()],
                range,
                shard: None,
            }),
            expiration: None,
            signature: vec![7; 64],
        }
    }

    pub fn seed_equals(&self, digest: &Digest, equals: &Digest) -> Claim {
        let claim = Claim {
            issuer: Did::new("did:key:zStorageNode").unwrap(),
            audience: Did::new("did:web:cairn.test").unwrap(),
            caveats: Caveats::Equals(EqualsCaveats {
                content: digest.clone(),
                equals: equals.clone(),
            }),
            expiration: None,
            signature: vec![8; 64],
        };
        let record = ProviderRecord {
            context_id: ContextId::from_digest(digest),
            metadata: Metadata::Equals {
                claim: claim.content_id(),
                equals: equals.clone(),
                expiration: None,
            },
            provider: self.storage_provider(),
        };
        self.world.add_claim(&claim);
        self.world.add_record(digest, &record);
        claim
    }

    /// Seed an index claim for `content`, hosting the serialized index
    /// as a blob with its own location record.
    pub fn seed_index(&self, content: &Digest, index: &blob_index::ShardIndex) -> Claim {
        let archive = index.to_archive();
        let index_cid = Cid::from_block(DAG_CBOR, &archive);
        let index_digest = index_cid.digest().clone();

        let claim = Claim {
            issuer: Did::new("did:key:zStorageNode").unwrap(),
            audience: Did::new("did:web:cairn.test").unwrap(),
            caveats: Caveats::Index(IndexCaveats {
                content: content.clone(),
                index: index_cid.clone(),
            }),
            expiration: None,
            signature: vec![9; 64],
        };
        let record = ProviderRecord {
            context_id: ContextId::from_digest(content),
            metadata: Metadata::Index {
                claim: claim.content_id(),
                index: index_cid,
                expiration: None,
            },
            provider: self.storage_provider(),
        };
        self.world.add_claim(&claim);
        self.world.add_record(content, &record);

        self.world.add_blob(&index_digest, archive);
        self.seed_location(&index_digest, None);
        claim
    }

    /// Run a query through the live HTTP surface and decode the result
    /// container.
    pub async fn query(&self, params: &str) -> (reqwest::StatusCode, crate::container::QueryResults) {
        let response = self
            .http
            .get(self.base_url.join(&format!("claims?{params}")).unwrap())
            .send()
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.bytes().await.unwrap();

        let results = if status.is_success() {
            crate::container::decode_results(&bytes).unwrap()
        } else {
            crate::container::QueryResults::default()
        };
        (status, results)
    }

    pub async fn head(&self) -> Cid {
        let bytes = self.advert_store.head().await.unwrap().unwrap();
        ipni::SignedHead::from_bytes(&bytes).unwrap().head
    }
}
