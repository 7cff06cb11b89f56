use crate::{BlobIndexLookup, ClaimLookup, Error, ProviderIndex, Result};
use blob_index::ShardIndex;
use futures::stream::{FuturesUnordered, StreamExt};
use models::{Caveats, Cid, Claim, ClaimKinds, Digest, Query};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

/// One unit of walk work. Jobs are deduplicated on the full triple: the
/// same digest may legitimately be visited again under a different
/// allowed-kinds set or index flag.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct Job {
    digest: Digest,
    is_index: bool,
    kinds: ClaimKinds,
}

/// WalkResult is the closure the walker accumulates. Both maps are
/// semantically unordered sets; the keyed form deduplicates and gives
/// callers a deterministic iteration order for serialization.
#[derive(Default)]
pub struct WalkResult {
    pub claims: BTreeMap<Cid, Arc<Claim>>,
    pub indexes: BTreeMap<Digest, Arc<ShardIndex>>,
}

#[derive(Default)]
struct JobOutcome {
    claims: Vec<(Cid, Arc<Claim>)>,
    indexes: Vec<Arc<ShardIndex>>,
    follow_ups: Vec<Job>,
}

/// QueryWalker produces the transitive closure of claims and shard
/// indexes reachable from a query's seed digests, running provider,
/// claim, and index lookups through a bounded pool of concurrent jobs.
///
/// Cancelling the future returned by `query` cancels every in-flight
/// lookup it spawned.
pub struct QueryWalker {
    providers: Arc<ProviderIndex>,
    claims: Arc<ClaimLookup>,
    blobs: Arc<BlobIndexLookup>,
    concurrency: usize,
}

impl QueryWalker {
    pub fn new(
        providers: Arc<ProviderIndex>,
        claims: Arc<ClaimLookup>,
        blobs: Arc<BlobIndexLookup>,
        concurrency: usize,
    ) -> Self {
        Self {
            providers,
            claims,
            blobs,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn query(&self, query: &Query) -> Result<WalkResult> {
        let now_secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);

        let mut seen: HashSet<Job> = HashSet::new();
        let mut pending: VecDeque<Job> = VecDeque::new();
        let mut running = FuturesUnordered::new();
        let mut result = WalkResult::default();

        // The query-type restriction applies to seed jobs only;
        // follow-ups always carry their own allowed-kinds set.
        for digest in &query.hashes {
            let job = Job {
                digest: digest.clone(),
                is_index: false,
                kinds: query.kind.seed_kinds(),
            };
            if seen.insert(job.clone()) {
                pending.push_back(job);
            }
        }

        loop {
            while running.len() < self.concurrency {
                let Some(job) = pending.pop_front() else {
                    break;
                };
                running.push(self.run_job(query, job, now_secs));
            }

            let Some(outcome) = running.next().await else {
                break;
            };
            let outcome = outcome?;

            for (cid, claim) in outcome.claims {
                result.claims.insert(cid, claim);
            }
            for index in outcome.indexes {
                result.indexes.insert(index.content().clone(), index);
            }
            for job in outcome.follow_ups {
                if seen.insert(job.clone()) {
                    pending.push_back(job);
                }
            }
        }

        tracing::debug!(
            claims = result.claims.len(),
            indexes = result.indexes.len(),
            visited = seen.len(),
            "completed query walk"
        );
        Ok(result)
    }

    async fn run_job(&self, query: &Query, job: Job, now_secs: u64) -> Result<JobOutcome> {
        let mut outcome = JobOutcome::default();

        // "Not found" contributes nothing and is not an error.
        let Some(records) = self
            .providers
            .find(&job.digest, &query.subjects, job.kinds)
            .await?
        else {
            return Ok(outcome);
        };

        for record in records {
            let cid = record.metadata.claim().clone();
            let Some(claim) = self.claims.get(&cid, &record.provider).await? else {
                continue;
            };
            if claim.is_expired(now_secs) {
                tracing::debug!(claim = %cid, "skipping expired claim");
                continue;
            }
            outcome.claims.push((cid, claim.clone()));

            match &claim.caveats {
                Caveats::Equals(caveats) => {
                    // Chase whichever side of the equivalence we did
                    // not arrive by, deciding by raw hash bytes.
                    let next = if record.context_id.is_digest(&job.digest) {
                        caveats.equals.clone()
                    } else {
                        caveats.content.clone()
                    };
                    outcome.follow_ups.push(Job {
                        digest: next,
                        is_index: false,
                        kinds: ClaimKinds::LOCATION,
                    });
                }
                Caveats::Index(caveats) => {
                    outcome.follow_ups.push(Job {
                        digest: caveats.index.digest().clone(),
                        is_index: true,
                        kinds: ClaimKinds::LOCATION,
                    });
                }
                Caveats::Location(caveats) if job.is_index => {
                    let Some(fetch_url) = caveats.location.first() else {
                        return Err(Error::NoLocation {
                            digest: job.digest.clone(),
                        });
                    };

                    let index = self
                        .blobs
                        .find(
                            &record.context_id,
                            &record,
                            fetch_url,
                            caveats.range,
                            None,
                        )
                        .await?;

                    for shard in index.shard_digests() {
                        outcome.follow_ups.push(Job {
                            digest: shard.clone(),
                            is_index: false,
                            kinds: ClaimKinds::EQUALS.with(ClaimKinds::LOCATION),
                        });
                    }
                    outcome.indexes.push(index);
                }
                // A location claim for plain content is a leaf.
                Caveats::Location(_) => {}
                // Other claim kinds are transported, not chased.
                Caveats::Relation(_) => {}
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use blob_index::Position;
    use ipni::Keypair;
    use models::{
        ByteRange, Capability, ContextId, Did, EqualsCaveats, IndexCaveats, LocationCaveats,
        Metadata, ProviderInfo, ProviderRecord, QueryKind, DAG_CBOR,
    };
    use publisher::{Publisher, PublisherConfig};
    use stores::{
        ClaimStore, MemoryAdvertStore, MemoryClaimStore, MemoryContextTable, MemoryJobQueue,
        MemoryProviderStore, MemoryShardIndexStore, ProviderStore, ShardIndexStore,
    };

    /// An engine over in-memory stores. Tests seed the caches directly,
    /// so the walker never needs a live indexer or blob host.
    struct Engine {
        providers: Arc<MemoryProviderStore>,
        claims: Arc<MemoryClaimStore>,
        shards: Arc<MemoryShardIndexStore>,
        walker: QueryWalker,
    }

    impl Engine {
        fn new() -> Self {
            let providers = Arc::new(MemoryProviderStore::default());
            let claims = Arc::new(MemoryClaimStore::default());
            let shards = Arc::new(MemoryShardIndexStore::default());

            let http = reqwest::Client::new();
            let client = ipni::Client::new(
                http.clone(),
                "https://indexer.invalid/".parse().unwrap(),
            );
            let keypair = Keypair::generate();
            let provider_info = ProviderInfo {
                peer: keypair.peer_id(),
                addresses: vec!["https://cairn.example/".parse().unwrap()],
            };
            let publisher = Arc::new(Publisher::new(
                keypair,
                provider_info,
                Arc::new(MemoryAdvertStore::default()),
                Arc::new(MemoryContextTable::default()),
                Arc::new(MemoryContextTable::default()),
                client.clone(),
                PublisherConfig {
                    topic: "/indexer/ingest/testnet".to_string(),
                    announce_urls: Vec::new(),
                },
            ));

            let provider_index = Arc::new(ProviderIndex::new(
                providers.clone(),
                client,
                Arc::new(crate::NoLegacy),
                publisher,
            ));
            let claim_lookup = Arc::new(ClaimLookup::new(claims.clone(), http.clone()));
            let blob_lookup = Arc::new(BlobIndexLookup::new(
                shards.clone(),
                Arc::new(MemoryJobQueue::new(1024)),
                http,
            ));

            Self {
                providers,
                claims,
                shards,
                walker: QueryWalker::new(provider_index, claim_lookup, blob_lookup, 5),
            }
        }

        fn provider_info(&self) -> ProviderInfo {
            ProviderInfo {
                peer: "zStorageNode".to_string(),
                addresses: vec!["https://node.example/".parse().unwrap()],
            }
        }

        /// Seed a location claim for `digest` and return its record.
        async fn seed_location(&self, digest: &Digest, context: ContextId) -> Arc<Claim> {
            let claim = Arc::new(Claim {
                issuer: Did::new("did:key:zIssuer").unwrap(),
                audience: Did::new("did:web:cairn.network").unwrap(),
                caveats: Caveats::Location(LocationCaveats {
                    content: digest.clone(),
                    location: vec![format!("https://u.example/{digest}").parse().unwrap()],
                    range: Some(ByteRange::new(0, Some(500))),
                    shard: None,
                }),
                expiration: None,
                signature: vec![1; 64],
            });
            self.seed(digest, context, claim.clone(), None).await;
            claim
        }

        async fn seed_equals(&self, digest: &Digest, equals: &Digest) -> Arc<Claim> {
            let claim = Arc::new(Claim {
                issuer: Did::new("did:key:zIssuer").unwrap(),
                audience: Did::new("did:web:cairn.network").unwrap(),
                caveats: Caveats::Equals(EqualsCaveats {
                    content: digest.clone(),
                    equals: equals.clone(),
                }),
                expiration: None,
                signature: vec![2; 64],
            });
            self.seed(digest, ContextId::from_digest(digest), claim.clone(), None)
                .await;
            claim
        }

        async fn seed_index(&self, digest: &Digest, index: &ShardIndex) -> Arc<Claim> {
            let index_cid = Cid::from_block(DAG_CBOR, &index.to_archive());
            let claim = Arc::new(Claim {
                issuer: Did::new("did:key:zIssuer").unwrap(),
                audience: Did::new("did:web:cairn.network").unwrap(),
                caveats: Caveats::Index(IndexCaveats {
                    content: digest.clone(),
                    index: index_cid.clone(),
                }),
                expiration: None,
                signature: vec![3; 64],
            });
            self.seed(digest, ContextId::from_digest(digest), claim.clone(), None)
                .await;

            // The index blob itself: a location record for the index
            // digest, plus the parsed index pre-cached under that
            // record's context.
            let index_digest = index_cid.digest().clone();
            self.seed_location(&index_digest, ContextId::from_digest(&index_digest))
                .await;
            self.shards
                .put(
                    &ContextId::from_digest(&index_digest),
                    Arc::new(index.clone()),
                    true,
                )
                .await
                .unwrap();
            claim
        }

        /// Install `claim` in the claim store and a provider record for
        /// `digest` in the provider cache.
        async fn seed(
            &self,
            digest: &Digest,
            context: ContextId,
            claim: Arc<Claim>,
            expiration: Option<u64>,
        ) {
            let cid = claim.content_id();
            self.claims.put(cid.clone(), claim.clone()).await.unwrap();

            let metadata = match claim.capability() {
                Capability::Location => Metadata::Location {
                    claim: cid,
                    range: None,
                    shard: None,
                    expiration,
                },
                Capability::Index => Metadata::Index {
                    claim: cid,
                    index: match &claim.caveats {
                        Caveats::Index(caveats) => caveats.index.clone(),
                        _ => unreachable!(),
                    },
                    expiration,
                },
                Capability::Equals => Metadata::Equals {
                    claim: cid,
                    equals: match &claim.caveats {
                        Caveats::Equals(caveats) => caveats.equals.clone(),
                        _ => unreachable!(),
                    },
                    expiration,
                },
                Capability::Relation(_) => unreachable!(),
            };

            self.providers
                .add(
                    digest,
                    &[ProviderRecord {
                        context_id: context,
                        metadata,
                        provider: self.provider_info(),
                    }],
                    true,
                )
                .await
                .unwrap();
        }

        /// Every digest the walker may touch must resolve without the
        /// network; unknown digests get a cached empty.
        async fn seed_empty(&self, digest: &Digest) {
            self.providers.set_empty(digest).await.unwrap();
        }
    }

    fn kinds_of(result: &WalkResult) -> Vec<Capability> {
        let mut kinds: Vec<Capability> = result
            .claims
            .values()
            .map(|claim| claim.capability())
            .collect();
        kinds.sort_by_key(|kind| kind.as_str().to_string());
        kinds
    }

    #[tokio::test]
    async fn test_simple_location_lookup() {
        let engine = Engine::new();
        let d1 = Digest::sha2_256(b"D1");
        let claim = engine
            .seed_location(&d1, ContextId::from_digest(&d1))
            .await;

        let result = engine
            .walker
            .query(&Query::standard(vec![d1.clone()]))
            .await
            .unwrap();

        assert_eq!(result.claims.len(), 1);
        assert_eq!(result.indexes.len(), 0);
        let found = result.claims.get(&claim.content_id()).unwrap();
        assert_eq!(found.capability(), Capability::Location);
        assert_eq!(found.content(), &d1);
        match &found.caveats {
            Caveats::Location(caveats) => {
                assert_eq!(caveats.range, Some(ByteRange::new(0, Some(500))));
            }
            other => panic!("expected location caveats, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_equals_chasing() {
        let engine = Engine::new();
        let d1 = Digest::sha2_256(b"D1");
        let d2 = Digest::sha2_256(b"D2");

        engine.seed_equals(&d1, &d2).await;
        engine
            .seed_location(&d2, ContextId::from_digest(&d2))
            .await;

        let result = engine
            .walker
            .query(&Query::standard(vec![d1]))
            .await
            .unwrap();

        assert_eq!(result.claims.len(), 2);
        assert_eq!(
            kinds_of(&result),
            vec![Capability::Equals, Capability::Location]
        );
    }

    #[tokio::test]
    async fn test_index_fan_out() {
        let engine = Engine::new();
        let root = Digest::sha2_256(b"R");
        let b1 = Digest::sha2_256(b"b1");
        let b2 = Digest::sha2_256(b"b2");
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
            b1.clone(),
            Position {
                offset: 100,
                length: 100,
            },
        );
        index.insert(
            s2.clone(),
            b2.clone(),
            Position {
                offset: 0,
                length: 50,
            },
        );

        engine.seed_index(&root, &index).await;
        engine
            .seed_location(&s1, ContextId::from_digest(&s1))
            .await;
        engine
            .seed_location(&s2, ContextId::from_digest(&s2))
            .await;

        let result = engine
            .walker
            .query(&Query::standard(vec![root.clone()]))
            .await
            .unwrap();

        // One shard index, and claims: the index claim for R, the
        // location of the index blob, and locations of both shards.
        assert_eq!(result.indexes.len(), 1);
        assert_eq!(result.indexes.get(&root).unwrap().content(), &root);
        assert_eq!(
            kinds_of(&result),
            vec![
                Capability::Index,
                Capability::Location,
                Capability::Location,
                Capability::Location,
            ]
        );
    }

    #[tokio::test]
    async fn test_subject_filtering() {
        let engine = Engine::new();
        let d1 = Digest::sha2_256(b"D1");
        let u = Did::new("did:key:zU").unwrap();
        let v = Did::new("did:key:zV").unwrap();

        let u_claim = engine
            .seed_location(&d1, ContextId::from_subject(&u, &d1))
            .await;
        let _v_claim = engine
            .seed_location(&d1, ContextId::from_subject(&v, &d1))
            .await;

        let result = engine
            .walker
            .query(&Query {
                hashes: vec![d1],
                subjects: vec![u],
                kind: QueryKind::Standard,
            })
            .await
            .unwrap();

        assert_eq!(result.claims.len(), 1);
        assert!(result.claims.contains_key(&u_claim.content_id()));
    }

    #[tokio::test]
    async fn test_location_query_restricts_seed_kinds() {
        let engine = Engine::new();
        let d1 = Digest::sha2_256(b"D1");
        let d2 = Digest::sha2_256(b"D2");

        engine.seed_equals(&d1, &d2).await;
        engine
            .seed_location(&d1, ContextId::from_digest(&d1))
            .await;
        engine.seed_empty(&d2).await;

        let result = engine
            .walker
            .query(&Query {
                hashes: vec![d1],
                subjects: Vec::new(),
                kind: QueryKind::Location,
            })
            .await
            .unwrap();

        // The equals record is filtered at the seed; every returned
        // claim is a location claim.
        assert_eq!(kinds_of(&result), vec![Capability::Location]);
    }

    #[tokio::test]
    async fn test_unknown_digest_is_empty_not_error() {
        let engine = Engine::new();
        let unknown = Digest::sha2_256(b"unknown");
        engine.seed_empty(&unknown).await;

        let result = engine
            .walker
            .query(&Query::standard(vec![unknown]))
            .await
            .unwrap();
        assert!(result.claims.is_empty());
        assert!(result.indexes.is_empty());
    }

    #[tokio::test]
    async fn test_index_or_location_restricts_seed_kinds() {
        let engine = Engine::new();
        let d1 = Digest::sha2_256(b"D1");
        let d2 = Digest::sha2_256(b"D2");

        engine.seed_equals(&d1, &d2).await;
        engine
            .seed_location(&d1, ContextId::from_digest(&d1))
            .await;

        let result = engine
            .walker
            .query(&Query {
                hashes: vec![d1],
                subjects: Vec::new(),
                kind: QueryKind::IndexOrLocation,
            })
            .await
            .unwrap();

        assert_eq!(kinds_of(&result), vec![Capability::Location]);
    }

    #[tokio::test]
    async fn test_expired_claims_are_skipped() {
        let engine = Engine::new();
        let d1 = Digest::sha2_256(b"D1");

        let expired = Arc::new(Claim {
            issuer: Did::new("did:key:zIssuer").unwrap(),
            audience: Did::new("did:web:cairn.network").unwrap(),
            caveats: Caveats::Location(LocationCaveats {
                content: d1.clone(),
                location: vec!["https://u.example/old".parse().unwrap()],
                range: None,
                shard: None,
            }),
            expiration: Some(1_000), // Long past.
            signature: vec![4; 64],
        });
        engine
            .seed(&d1, ContextId::from_digest(&d1), expired, Some(1_000))
            .await;

        let result = engine
            .walker
            .query(&Query::standard(vec![d1]))
            .await
            .unwrap();
        assert!(result.claims.is_empty());
    }

    #[tokio::test]
    async fn test_diamond_follow_ups_deduplicate() {
        let engine = Engine::new();
        let d1 = Digest::sha2_256(b"D1");
        let d2 = Digest::sha2_256(b"D2");
        let d3 = Digest::sha2_256(b"D3");

        // Two equivalences converge on D3, which must be visited once.
        engine.seed_equals(&d1, &d3).await;
        engine.seed_equals(&d2, &d3).await;
        engine
            .seed_location(&d3, ContextId::from_digest(&d3))
            .await;

        let result = engine
            .walker
            .query(&Query::standard(vec![d1, d2]))
            .await
            .unwrap();

        assert_eq!(
            kinds_of(&result),
            vec![
                Capability::Equals,
                Capability::Equals,
                Capability::Location,
            ]
        );
    }

    #[tokio::test]
    async fn test_results_are_deterministic_sets() {
        let engine = Engine::new();
        let d1 = Digest::sha2_256(b"D1");
        let d2 = Digest::sha2_256(b"D2");
        engine.seed_equals(&d1, &d2).await;
        engine
            .seed_location(&d2, ContextId::from_digest(&d2))
            .await;

        let query = Query::standard(vec![d1.clone(), d1]);
        let first = engine.walker.query(&query).await.unwrap();
        let second = engine.walker.query(&query).await.unwrap();

        let keys = |result: &WalkResult| result.claims.keys().cloned().collect::<Vec<_>>();
        assert_eq!(keys(&first), keys(&second));
    }
}
