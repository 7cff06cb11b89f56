use super::{ApiError, App};
use crate::container;
use axum::extract::{RawQuery, State};
use axum::http::header;
use axum::response::IntoResponse;
use models::{Query, QueryKind};
use std::sync::Arc;

/// `GET /claims?multihash=…[&multihash=…][&spaces=…][&type=…]`
///
/// Runs the query walker and returns the result container. Empty
/// results are a 200 with an empty container, never an error.
pub async fn handle_query(
    State(app): State<Arc<App>>,
    RawQuery(raw): RawQuery,
) -> Result<impl IntoResponse, ApiError> {
    let query = parse_query(raw.as_deref().unwrap_or(""))?;

    let result = app.walker.query(&query).await?;
    tracing::debug!(
        hashes = query.hashes.len(),
        claims = result.claims.len(),
        indexes = result.indexes.len(),
        "served claims query"
    );

    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        container::encode_results(&result),
    ))
}

fn parse_query(raw: &str) -> Result<Query, ApiError> {
    let mut query = Query {
        hashes: Vec::new(),
        subjects: Vec::new(),
        kind: QueryKind::Standard,
    };

    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
        match key.as_ref() {
            "multihash" => query.hashes.push(value.parse().map_err(ApiError::bad_request)?),
            "spaces" => query
                .subjects
                .push(value.parse().map_err(ApiError::bad_request)?),
            "type" => query.kind = value.parse().map_err(ApiError::bad_request)?,
            other => {
                return Err(ApiError::bad_request(anyhow::anyhow!(
                    "unknown query parameter {other:?}"
                )))
            }
        }
    }

    if query.hashes.is_empty() {
        return Err(ApiError::bad_request(anyhow::anyhow!(
            "at least one multihash is required"
        )));
    }
    Ok(query)
}

#[cfg(test)]
mod test {
    use super::*;
    use models::Digest;

    #[test]
    fn test_parse_query() {
        let d1 = Digest::sha2_256(b"one");
        let d2 = Digest::sha2_256(b"two");

        let query = parse_query(&format!(
            "multihash={d1}&multihash={d2}&spaces=did%3Akey%3AzU&type=index_or_location"
        ))
        .unwrap();

        assert_eq!(query.hashes, vec![d1, d2]);
        assert_eq!(query.subjects.len(), 1);
        assert_eq!(query.kind, QueryKind::IndexOrLocation);
    }

    #[test]
    fn test_parse_query_rejects_malformed() {
        let d1 = Digest::sha2_256(b"one");

        for raw in [
            "",                                      // No multihash.
            "multihash=n0tbase58!!",                 // Malformed digest.
            "multihash={d1}&type=everything",        // Unknown type.
            "spaces=did%3Akey%3AzU",                 // Subjects but no digest.
        ] {
            let raw = raw.replace("{d1}", &d1.to_string());
            assert!(parse_query(&raw).is_err(), "raw: {raw}");
        }
    }
}
