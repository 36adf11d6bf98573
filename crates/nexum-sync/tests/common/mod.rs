//! Shared fixtures for orchestrator tests.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

use nexum_connector::error::{ConnectorError, ConnectorResult};
use nexum_connector::ids::OperationKey;
use nexum_sync::{ResourcePage, ResourceRecord, ResourceStream};

/// One scripted `fetch_page` outcome.
pub enum ScriptedFetch {
    Page(ResourcePage),
    TransientError(String),
    AuthError(String),
}

/// Stream whose pages and failures are scripted up front.
///
/// `fetch_page` consumes the script in order; an exhausted script yields
/// empty final pages.
pub struct ScriptedStream {
    resource_type: String,
    operation_key: OperationKey,
    script: Mutex<VecDeque<ScriptedFetch>>,
    apply_failures: HashMap<String, String>,
    applied: Mutex<Vec<String>>,
}

impl ScriptedStream {
    pub fn new(resource_type: &str) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            operation_key: OperationKey::for_sync(resource_type).unwrap(),
            script: Mutex::new(VecDeque::new()),
            apply_failures: HashMap::new(),
            applied: Mutex::new(Vec::new()),
        }
    }

    pub fn with_page(self, page: ResourcePage) -> Self {
        self.push(ScriptedFetch::Page(page))
    }

    pub fn with_fetch_error(self, message: &str) -> Self {
        self.push(ScriptedFetch::TransientError(message.to_string()))
    }

    pub fn with_auth_error(self, message: &str) -> Self {
        self.push(ScriptedFetch::AuthError(message.to_string()))
    }

    pub fn with_apply_failure(mut self, record_id: &str, message: &str) -> Self {
        self.apply_failures
            .insert(record_id.to_string(), message.to_string());
        self
    }

    fn push(self, fetch: ScriptedFetch) -> Self {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(fetch);
        self
    }

    /// Record ids `apply` was called with, in order.
    pub fn applied(&self) -> Vec<String> {
        self.applied
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl ResourceStream for ScriptedStream {
    fn resource_type(&self) -> &str {
        &self.resource_type
    }

    fn operation_key(&self) -> OperationKey {
        self.operation_key.clone()
    }

    async fn fetch_page(&self, _cursor: Option<&str>) -> ConnectorResult<ResourcePage> {
        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        match next {
            None => Ok(ResourcePage::new(vec![])),
            Some(ScriptedFetch::Page(page)) => Ok(page),
            Some(ScriptedFetch::TransientError(message)) => {
                Err(ConnectorError::unavailable(message))
            }
            Some(ScriptedFetch::AuthError(message)) => Err(ConnectorError::auth(message)),
        }
    }

    async fn apply(&self, record: &ResourceRecord) -> ConnectorResult<()> {
        self.applied
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.id.clone());

        match self.apply_failures.get(&record.id) {
            Some(message) => Err(ConnectorError::internal(message.clone())),
            None => Ok(()),
        }
    }
}

/// A record with a payload derived from its id.
pub fn record(id: &str) -> ResourceRecord {
    ResourceRecord::new(id, json!({ "id": id }))
}

/// A record stamped with a modification time.
pub fn record_modified_at(id: &str, modified_at: DateTime<Utc>) -> ResourceRecord {
    record(id).with_modified_at(modified_at)
}

/// N records `{prefix}-1 .. {prefix}-n` without modification times.
pub fn records(prefix: &str, n: usize) -> Vec<ResourceRecord> {
    (1..=n).map(|i| record(&format!("{prefix}-{i}"))).collect()
}
