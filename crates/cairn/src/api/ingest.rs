use super::{ApiError, App};
use crate::container;
use axum::extract::State;
use axum::Json;
use models::{Caveats, Cid, Claim, ContextId, Metadata, ProviderRecord};
use std::sync::Arc;
use stores::ClaimStore as _;

#[derive(Debug, serde::Serialize)]
pub struct Receipt {
    pub claim: Cid,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `POST /claims`
///
/// Accepts an envelope of signed claims. Each claim is persisted and
/// its digest published to the advert chain. Index claims additionally
/// have their shard index fetched so every digest inside is queued for
/// provider-record backfill.
pub async fn handle_ingest(
    State(app): State<Arc<App>>,
    body: axum::body::Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let claims = container::decode_ingest(&body).map_err(ApiError::bad_request)?;

    let mut receipts = Vec::with_capacity(claims.len());
    for claim in &claims {
        let cid = claim.content_id();
        let receipt = match ingest_claim(&app, claim, &claims).await {
            Ok(outcome) => Receipt {
                claim: cid,
                ok: true,
                outcome: Some(outcome),
                error: None,
            },
            Err(err) => {
                tracing::warn!(claim = %cid, ?err, "failed to ingest claim");
                Receipt {
                    claim: cid,
                    ok: false,
                    outcome: None,
                    error: Some(format!("{err:#}")),
                }
            }
        };
        receipts.push(receipt);
    }

    Ok(Json(serde_json::json!({ "receipts": receipts })))
}

async fn ingest_claim(
    app: &App,
    claim: &Claim,
    envelope: &[Claim],
) -> anyhow::Result<&'static str> {
    let cid = claim.content_id();
    app.claims.put(cid.clone(), Arc::new(claim.clone())).await?;

    let metadata = match &claim.caveats {
        Caveats::Location(caveats) => Metadata::Location {
            claim: cid,
            range: caveats.range,
            shard: caveats.shard.clone(),
            expiration: claim.expiration,
        },
        Caveats::Index(caveats) => Metadata::Index {
            claim: cid,
            index: caveats.index.clone(),
            expiration: claim.expiration,
        },
        Caveats::Equals(caveats) => Metadata::Equals {
            claim: cid,
            equals: caveats.equals.clone(),
            expiration: claim.expiration,
        },
        // Other claim kinds are stored and served, never advertised.
        Caveats::Relation(_) => return Ok("stored"),
    };

    let content = claim.content().clone();
    let record = ProviderRecord {
        context_id: ContextId::from_digest(&content),
        metadata,
        provider: app.provider_info.clone(),
    };

    let outcome = app
        .provider_index
        .publish(std::slice::from_ref(&content), &record)
        .await?;

    if let Caveats::Index(caveats) = &claim.caveats {
        fetch_index_for_backfill(app, caveats.index.digest(), envelope, &record).await?;
    }

    Ok(match outcome {
        publisher::PublishOutcome::Published(_) => "published",
        publisher::PublishOutcome::AlreadyAdvertised => "already advertised",
    })
}

/// Resolve the just-ingested index's own location from the envelope and
/// fetch it, which queues a backfill job per digest in the index. Queue
/// refusal propagates: ingest slows down before the cacher drowns.
async fn fetch_index_for_backfill(
    app: &App,
    index_digest: &models::Digest,
    envelope: &[Claim],
    record: &ProviderRecord,
) -> anyhow::Result<()> {
    let location = envelope.iter().find_map(|claim| match &claim.caveats {
        Caveats::Location(caveats) if &caveats.content == index_digest => Some(caveats),
        _ => None,
    });

    let Some(caveats) = location else {
        tracing::debug!(
            index = %index_digest,
            "no location claim for index in envelope; skipping backfill"
        );
        return Ok(());
    };
    let Some(url) = caveats.location.first() else {
        return Ok(());
    };

    let index_record = ProviderRecord {
        context_id: ContextId::from_digest(index_digest),
        metadata: record.metadata.clone(),
        provider: app.provider_info.clone(),
    };

    app.blobs
        .find(
            &ContextId::from_digest(index_digest),
            &index_record,
            url,
            caveats.range,
            None,
        )
        .await?;
    Ok(())
}
