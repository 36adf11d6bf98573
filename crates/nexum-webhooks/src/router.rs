//! Axum ingest endpoint for provider deliveries.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;

use nexum_connector::ids::ProviderId;

use crate::error::WebhookError;
use crate::gateway::WebhookGateway;

/// Acknowledgement body for processed deliveries.
#[derive(Debug, Serialize)]
struct DeliveryReceipt {
    status: &'static str,
}

/// Creates the ingest router.
///
/// Providers POST to `/webhooks/{provider}` with their signature header;
/// the response status follows the delivery's disposition.
pub fn ingest_router(gateway: Arc<WebhookGateway>) -> Router {
    Router::new()
        .route("/webhooks/:provider", post(receive_delivery))
        .with_state(gateway)
}

async fn receive_delivery(
    State(gateway): State<Arc<WebhookGateway>>,
    Path(provider): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Ok(provider) = provider.parse::<ProviderId>() else {
        return WebhookError::UnknownProvider.into_response();
    };

    // Signatures cover the body bytes as received, so reject anything the
    // gateway could not hand to a connector unmodified.
    let Ok(body) = std::str::from_utf8(&body) else {
        return WebhookError::InvalidPayload("body is not valid UTF-8".to_string())
            .into_response();
    };

    match gateway
        .handle(&provider, headers_to_map(&headers), query, body)
        .await
    {
        Ok(disposition) => {
            let status =
                StatusCode::from_u16(disposition.status_code()).unwrap_or(StatusCode::OK);
            (
                status,
                Json(DeliveryReceipt {
                    status: disposition.as_str(),
                }),
            )
                .into_response()
        }
        Err(err) => err.into_response(),
    }
}

fn headers_to_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::HeaderValue;

    #[test]
    fn test_headers_to_map_lowercases_and_skips_binary() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Acme-Signature", HeaderValue::from_static("abc"));
        headers.insert(
            "x-binary",
            HeaderValue::from_bytes(&[0xff, 0xfe]).unwrap(),
        );

        let map = headers_to_map(&headers);
        assert_eq!(map.get("x-acme-signature").map(String::as_str), Some("abc"));
        assert!(!map.contains_key("x-binary"));
    }
}
