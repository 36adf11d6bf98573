//! Identifier types for providers and outbound operations.
//!
//! Newtype wrappers with validation, so governor keys and sync metadata
//! never carry free-form strings.

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

/// Identifier for a third-party provider (`stripe`, `hubspot`, `google`).
///
/// Lowercase ASCII letters, digits, `-` and `_`; never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProviderId(String);

impl ProviderId {
    /// Parse a provider id from a string.
    pub fn parse(s: &str) -> Result<Self, ParseProviderIdError> {
        if s.is_empty()
            || !s
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            return Err(ParseProviderIdError(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProviderId {
    type Err = ParseProviderIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ProviderId {
    type Error = ParseProviderIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ProviderId> for String {
    fn from(id: ProviderId) -> Self {
        id.0
    }
}

/// Error parsing a provider id from a string.
#[derive(Debug, Clone)]
pub struct ParseProviderIdError(String);

impl fmt::Display for ParseProviderIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid provider id '{}', expected lowercase letters, digits, '-' or '_'",
            self.0
        )
    }
}

impl std::error::Error for ParseProviderIdError {}

/// Identifier for a class of outbound calls (`sync.contacts`,
/// `api.create_task`), used to scope rate-limit and circuit-breaker state.
///
/// Dot-separated segments of lowercase ASCII letters, digits, `-` and `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OperationKey(String);

impl OperationKey {
    /// Parse an operation key from a string.
    pub fn parse(s: &str) -> Result<Self, ParseOperationKeyError> {
        let valid = !s.is_empty()
            && s.split('.').all(|segment| {
                !segment.is_empty()
                    && segment.chars().all(|c| {
                        c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_'
                    })
            });
        if !valid {
            return Err(ParseOperationKeyError(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// Build the conventional key for syncing one resource type:
    /// `sync.{resource_type}`.
    pub fn for_sync(resource_type: &str) -> Result<Self, ParseOperationKeyError> {
        Self::parse(&format!("sync.{resource_type}"))
    }

    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OperationKey {
    type Err = ParseOperationKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for OperationKey {
    type Error = ParseOperationKeyError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<OperationKey> for String {
    fn from(key: OperationKey) -> Self {
        key.0
    }
}

/// Error parsing an operation key from a string.
#[derive(Debug, Clone)]
pub struct ParseOperationKeyError(String);

impl fmt::Display for ParseOperationKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid operation key '{}', expected dot-separated lowercase segments",
            self.0
        )
    }
}

impl std::error::Error for ParseOperationKeyError {}
