use super::{ApiError, App};
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use models::{Caveats, Cid, ContextId, Metadata, ProviderRecord, Query};
use std::sync::Arc;
use stores::ClaimStore as _;

/// `GET /claim/{cid}`
///
/// The raw signed claim bytes.
pub async fn handle_claim(
    State(app): State<Arc<App>>,
    Path(cid): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let cid: Cid = cid.parse().map_err(ApiError::bad_request)?;

    let Some(claim) = app.claims.get(&cid).await.map_err(anyhow::Error::from)? else {
        return Err(ApiError::not_found("claim"));
    };

    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        claim.to_bytes(),
    ))
}

/// `GET /cid/{cid}`
///
/// Indexer-style find passthrough. Converts the CID to its digest,
/// runs a standard query, and emits a single JSON find-response naming
/// this service's own provider record when any location claim exists.
pub async fn handle_cid(
    State(app): State<Arc<App>>,
    Path(cid): Path<String>,
) -> Result<axum::Json<ipni::wire::FindResponse>, ApiError> {
    let cid: Cid = cid.parse().map_err(ApiError::bad_request)?;
    let digest = cid.digest().clone();

    let result = app.walker.query(&Query::standard(vec![digest.clone()])).await?;

    let location = result.claims.iter().find_map(|(cid, claim)| {
        matches!(&claim.caveats, Caveats::Location(_)).then(|| (cid.clone(), claim.clone()))
    });
    let Some((claim_cid, claim)) = location else {
        return Err(ApiError::not_found("location claim"));
    };

    let metadata = match &claim.caveats {
        Caveats::Location(caveats) => Metadata::Location {
            claim: claim_cid,
            range: caveats.range,
            shard: caveats.shard.clone(),
            expiration: claim.expiration,
        },
        _ => unreachable!("filtered to location claims"),
    };

    let record = ProviderRecord {
        context_id: ContextId::from_digest(&digest),
        metadata,
        provider: app.provider_info.clone(),
    };

    Ok(axum::Json(ipni::wire::FindResponse {
        multihash_results: vec![ipni::wire::MultihashResult {
            multihash: digest,
            provider_results: vec![ipni::wire::ProviderResult::from_record(&record)],
        }],
    }))
}
