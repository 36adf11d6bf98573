//! Delivery verification and event routing.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use nexum_connector::ids::ProviderId;
use nexum_connector::traits::Connector;
use nexum_connector::types::WebhookPayload;

use crate::error::{GatewayResult, WebhookError};

/// One provider's webhook wiring: where its signature lives, which events
/// it routes, and the connector that handles them.
#[derive(Clone)]
pub struct WebhookRegistration {
    /// Provider the registration belongs to.
    pub provider: ProviderId,
    /// Header carrying the delivery signature (`x-acme-signature`).
    pub signature_header: String,
    /// Event types routed to the handler. Empty routes every event.
    pub events: Vec<String>,
    /// Connector invoked for routed deliveries.
    pub connector: Arc<dyn Connector>,
}

impl WebhookRegistration {
    /// Create a registration routing every event type.
    #[must_use]
    pub fn new(
        provider: ProviderId,
        signature_header: impl Into<String>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            provider,
            signature_header: signature_header.into().to_ascii_lowercase(),
            events: Vec::new(),
            connector,
        }
    }

    /// Restrict routing to the given event types.
    #[must_use]
    pub fn with_events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.events = events.into_iter().map(Into::into).collect();
        self
    }

    fn routes_event(&self, event: Option<&str>) -> bool {
        match event {
            // Event-less bodies are provider-specific formats; the
            // connector decides what to do with them.
            None => true,
            Some(event) => {
                self.events.is_empty() || self.events.iter().any(|e| e == event)
            }
        }
    }
}

impl fmt::Debug for WebhookRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookRegistration")
            .field("provider", &self.provider)
            .field("signature_header", &self.signature_header)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

/// Outcome of one delivery, mapped onto the HTTP response.
///
/// `Ignored` still acknowledges with 200 so providers do not retry events
/// we deliberately do not route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookDisposition {
    /// Verified, routed, and handled.
    Accepted,
    /// Verified but the event type is not routed; acknowledged anyway.
    Ignored,
    /// Signature missing or invalid.
    Rejected,
    /// Verified and routed, but the handler failed.
    HandlerFailed,
}

impl WebhookDisposition {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookDisposition::Accepted => "accepted",
            WebhookDisposition::Ignored => "ignored",
            WebhookDisposition::Rejected => "rejected",
            WebhookDisposition::HandlerFailed => "handler_failed",
        }
    }

    /// HTTP status the ingest endpoint answers with.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            WebhookDisposition::Accepted | WebhookDisposition::Ignored => 200,
            WebhookDisposition::Rejected => 401,
            WebhookDisposition::HandlerFailed => 500,
        }
    }
}

impl fmt::Display for WebhookDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Routes inbound deliveries to registered connectors after signature
/// verification.
///
/// Verification always runs against the raw body string exactly as the
/// endpoint received it. Why a delivery was rejected stays in the server
/// logs; callers only see the disposition.
#[derive(Debug, Default)]
pub struct WebhookGateway {
    routes: RwLock<HashMap<ProviderId, WebhookRegistration>>,
}

impl WebhookGateway {
    /// Create a gateway with no registrations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider, replacing any previous registration.
    pub async fn register(&self, registration: WebhookRegistration) {
        let mut routes = self.routes.write().await;
        info!(provider = %registration.provider, "webhook registration added");
        routes.insert(registration.provider.clone(), registration);
    }

    /// Remove a provider's registration. Returns whether one existed.
    pub async fn deregister(&self, provider: &ProviderId) -> bool {
        let removed = self.routes.write().await.remove(provider).is_some();
        if removed {
            info!(provider = %provider, "webhook registration removed");
        }
        removed
    }

    /// Providers currently registered.
    pub async fn registered_providers(&self) -> Vec<ProviderId> {
        self.routes.read().await.keys().cloned().collect()
    }

    /// Process one inbound delivery for a provider.
    ///
    /// The connector's handler (and any cache invalidation it performs) has
    /// completed before this returns.
    pub async fn handle(
        &self,
        provider: &ProviderId,
        headers: HashMap<String, String>,
        query: HashMap<String, String>,
        body: &str,
    ) -> GatewayResult<WebhookDisposition> {
        let registration = {
            let routes = self.routes.read().await;
            routes.get(provider).cloned()
        };
        let Some(registration) = registration else {
            warn!(provider = %provider, "delivery for unregistered provider");
            return Err(WebhookError::UnknownProvider);
        };

        let headers = headers
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect();
        let mut payload = WebhookPayload::new(headers, query, body);

        let Some(signature) = payload.header(&registration.signature_header).map(str::to_string)
        else {
            warn!(
                delivery_id = %payload.delivery_id,
                provider = %provider,
                signature_header = %registration.signature_header,
                "delivery rejected, signature header missing"
            );
            return Ok(WebhookDisposition::Rejected);
        };

        if !registration
            .connector
            .validate_webhook_signature(&payload, &signature)
        {
            warn!(
                delivery_id = %payload.delivery_id,
                provider = %provider,
                "delivery rejected, signature verification failed"
            );
            return Ok(WebhookDisposition::Rejected);
        }

        let (event, data) = parse_body(&payload.body);
        payload.event = event;
        payload.data = data;

        if !registration.routes_event(payload.event.as_deref()) {
            info!(
                delivery_id = %payload.delivery_id,
                provider = %provider,
                event = payload.event.as_deref().unwrap_or(""),
                "event type not routed, delivery acknowledged"
            );
            return Ok(WebhookDisposition::Ignored);
        }

        let disposition = match registration.connector.handle_webhook(&payload).await {
            Ok(()) => WebhookDisposition::Accepted,
            Err(err) => {
                warn!(
                    delivery_id = %payload.delivery_id,
                    provider = %provider,
                    error = %err,
                    "webhook handler failed"
                );
                WebhookDisposition::HandlerFailed
            }
        };

        info!(
            delivery_id = %payload.delivery_id,
            provider = %provider,
            event = payload.event.as_deref().unwrap_or(""),
            disposition = %disposition,
            "webhook delivery processed"
        );
        Ok(disposition)
    }
}

/// Extract the event type and parsed payload from a JSON body.
///
/// The event type lives under `event`, with `type` as the fallback some
/// providers use. Non-JSON bodies yield neither.
fn parse_body(body: &str) -> (Option<String>, Option<serde_json::Value>) {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => {
            let event = value
                .get("event")
                .and_then(serde_json::Value::as_str)
                .or_else(|| value.get("type").and_then(serde_json::Value::as_str))
                .map(str::to_string);
            (event, Some(value))
        }
        Err(_) => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disposition_status_codes() {
        assert_eq!(WebhookDisposition::Accepted.status_code(), 200);
        assert_eq!(WebhookDisposition::Ignored.status_code(), 200);
        assert_eq!(WebhookDisposition::Rejected.status_code(), 401);
        assert_eq!(WebhookDisposition::HandlerFailed.status_code(), 500);
    }

    #[test]
    fn test_parse_body_prefers_event_over_type() {
        let (event, data) = parse_body(r#"{"event":"contact.updated","type":"other"}"#);
        assert_eq!(event.as_deref(), Some("contact.updated"));
        assert!(data.is_some());
    }

    #[test]
    fn test_parse_body_falls_back_to_type() {
        let (event, _) = parse_body(r#"{"type":"deal.closed"}"#);
        assert_eq!(event.as_deref(), Some("deal.closed"));
    }

    #[test]
    fn test_parse_body_tolerates_non_json() {
        let (event, data) = parse_body("k1=v1&k2=v2");
        assert!(event.is_none());
        assert!(data.is_none());
    }
}
