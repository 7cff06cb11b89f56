use axum::routing::get;
use indexer::{BlobIndexLookup, ProviderIndex, QueryWalker};
use models::{Did, ProviderInfo};
use std::sync::Arc;
use stores::ClaimStore;

mod claim;
mod error;
mod ingest;
mod query;

pub use error::ApiError;

/// App is the service state shared by every handler.
pub struct App {
    pub did: Did,
    pub public_key: [u8; 32],
    /// The service's own provider record contents, advertised for
    /// everything it publishes.
    pub provider_info: ProviderInfo,
    pub provider_index: Arc<ProviderIndex>,
    pub walker: QueryWalker,
    pub claims: Arc<dyn ClaimStore>,
    pub blobs: Arc<BlobIndexLookup>,
}

/// Build the service's HTTP router.
pub fn build_router(app: Arc<App>) -> axum::Router<()> {
    axum::Router::new()
        .route("/", get(handle_root))
        .route(
            "/claims",
            get(query::handle_query).post(ingest::handle_ingest),
        )
        .route("/claim/:cid", get(claim::handle_claim))
        .route("/cid/:cid", get(claim::handle_cid))
        .route("/.well-known/did.json", get(handle_did_document))
        .with_state(app)
}

async fn handle_root() -> String {
    format!("⌘ cairn v{}\n", env!("CARGO_PKG_VERSION"))
}

async fn handle_did_document(
    axum::extract::State(app): axum::extract::State<Arc<App>>,
) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "@context": ["https://www.w3.org/ns/did/v1"],
        "id": &app.did,
        "verificationMethod": [{
            "id": format!("{}#key-1", app.did),
            "type": "Ed25519VerificationKey2020",
            "controller": &app.did,
            "publicKeyMultibase": format!("z{}", bs58::encode(app.public_key).into_string()),
        }],
    }))
}
