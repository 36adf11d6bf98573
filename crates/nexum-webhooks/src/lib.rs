//! Webhook ingestion for provider event deliveries.
//!
//! Provides the inbound gateway: raw-body HMAC-SHA256 verification with
//! constant-time comparison, event-type routing to registered connectors,
//! and the axum ingest endpoint providers POST to.

pub mod crypto;
pub mod error;
pub mod gateway;
pub mod router;

pub use error::WebhookError;
pub use gateway::{WebhookDisposition, WebhookGateway, WebhookRegistration};
pub use router::ingest_router;
