//! Connector instance configuration.

use std::collections::HashMap;
use std::fmt;
use serde::{Deserialize, Serialize};

use crate::error::{ConnectorError, ConnectorResult};
use crate::ids::ProviderId;

/// Configuration for one connector instance, bound to one user.
///
/// Which fields are required depends on the provider's auth strategy;
/// connectors declare their requirements through [`ConnectorConfig::require`]
/// at the start of `authenticate` and fail descriptively when fields are
/// absent.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Provider this instance talks to.
    pub provider: ProviderId,
    /// Owning user. Also the base of the vault key id convention.
    pub user_id: String,
    /// OAuth client id.
    #[serde(default)]
    pub client_id: Option<String>,
    /// OAuth client secret.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// OAuth redirect URI.
    #[serde(default)]
    pub redirect_uri: Option<String>,
    /// Shared secret for webhook signature verification.
    #[serde(default)]
    pub webhook_secret: Option<String>,
    /// OAuth scopes to request.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Provider-specific settings (instance URLs, API versions).
    #[serde(default)]
    pub settings: HashMap<String, String>,
}

impl ConnectorConfig {
    /// Create a configuration for the given provider and user.
    #[must_use]
    pub fn new(provider: ProviderId, user_id: impl Into<String>) -> Self {
        Self {
            provider,
            user_id: user_id.into(),
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            webhook_secret: None,
            scopes: Vec::new(),
            settings: HashMap::new(),
        }
    }

    /// Set the OAuth client id.
    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set the OAuth client secret.
    #[must_use]
    pub fn with_client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    /// Set the OAuth redirect URI.
    #[must_use]
    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    /// Set the webhook signing secret.
    #[must_use]
    pub fn with_webhook_secret(mut self, webhook_secret: impl Into<String>) -> Self {
        self.webhook_secret = Some(webhook_secret.into());
        self
    }

    /// Set the OAuth scopes to request.
    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Set a provider-specific setting.
    #[must_use]
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Look up a provider-specific setting.
    #[must_use]
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }

    /// Scopes joined as a single space-separated string.
    #[must_use]
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }

    /// Check that every named field is present and non-empty.
    ///
    /// Recognized names are the struct fields (`client_id`, `client_secret`,
    /// `redirect_uri`, `webhook_secret`, `scopes`, `user_id`); any other name
    /// is looked up in `settings`. All absent fields are reported together.
    pub fn require(&self, fields: &[&'static str]) -> ConnectorResult<()> {
        let missing: Vec<&'static str> = fields
            .iter()
            .copied()
            .filter(|field| !self.has_field(field))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConnectorError::missing_config(
                self.provider.as_str(),
                missing,
            ))
        }
    }

    fn has_field(&self, field: &str) -> bool {
        match field {
            "user_id" => !self.user_id.is_empty(),
            "client_id" => self.client_id.as_deref().is_some_and(|v| !v.is_empty()),
            "client_secret" => self.client_secret.as_deref().is_some_and(|v| !v.is_empty()),
            "redirect_uri" => self.redirect_uri.as_deref().is_some_and(|v| !v.is_empty()),
            "webhook_secret" => self
                .webhook_secret
                .as_deref()
                .is_some_and(|v| !v.is_empty()),
            "scopes" => !self.scopes.is_empty(),
            other => self.settings.get(other).is_some_and(|v| !v.is_empty()),
        }
    }
}

impl fmt::Debug for ConnectorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorConfig")
            .field("provider", &self.provider)
            .field("user_id", &self.user_id)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("redirect_uri", &self.redirect_uri)
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("scopes", &self.scopes)
            .field("settings", &self.settings)
            .finish()
    }
}
