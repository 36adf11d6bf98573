//! Multi-stream sync orchestration with partial-failure aggregation.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use nexum_connector::error::{ConnectorError, ConnectorResult};
use nexum_connector::ids::ProviderId;
use nexum_connector::resilience::{GovernorKey, RatePolicy, ResilienceGovernor};
use nexum_connector::types::{SyncMetadata, SyncOptions, SyncResult};

use crate::error::SyncError;
use crate::stream::{ResourcePage, ResourceStream};

/// Lifecycle phase of an orchestrator.
///
/// `Idle` until the first pass; a pass moves through `Running` into
/// `Completed` when it collected no errors, `PartiallyFailed` otherwise.
/// The phase reflects the most recent pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    /// No pass has run yet.
    #[default]
    Idle,
    /// A pass is executing.
    Running,
    /// The last pass finished without errors.
    Completed,
    /// The last pass finished with stream or item errors.
    PartiallyFailed,
}

impl SyncPhase {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Running => "running",
            SyncPhase::Completed => "completed",
            SyncPhase::PartiallyFailed => "partially_failed",
        }
    }

    /// Whether this phase is the end of a pass.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncPhase::Completed | SyncPhase::PartiallyFailed)
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-stream accumulation for one pass.
struct StreamOutcome {
    resource_type: String,
    processed: u64,
    skipped: u64,
    errors: Vec<String>,
    failed: bool,
    auth_failure: Option<ConnectorError>,
}

impl StreamOutcome {
    fn new(resource_type: &str) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            processed: 0,
            skipped: 0,
            errors: Vec::new(),
            failed: false,
            auth_failure: None,
        }
    }

    fn record_stream_failure(&mut self, err: &ConnectorError) {
        self.errors
            .push(format!("{} sync failed: {}", self.resource_type, err));
        self.failed = true;
    }
}

/// Runs one provider's resource streams concurrently and aggregates their
/// outcomes into a single [`SyncResult`].
///
/// Streams fail independently: one stream erroring mid-pagination never
/// aborts its siblings, it just lands in `errors` while partial data from
/// the others is kept. The only abort is invalid authentication, which
/// surfaces as [`SyncError::Unauthenticated`] after every stream has
/// settled.
pub struct SyncOrchestrator {
    provider: ProviderId,
    governor: Arc<ResilienceGovernor>,
    phase: RwLock<SyncPhase>,
}

impl SyncOrchestrator {
    /// Create an orchestrator for one provider.
    #[must_use]
    pub fn new(provider: ProviderId, governor: Arc<ResilienceGovernor>) -> Self {
        Self {
            provider,
            governor,
            phase: RwLock::new(SyncPhase::Idle),
        }
    }

    /// Provider this orchestrator syncs.
    #[must_use]
    pub fn provider(&self) -> &ProviderId {
        &self.provider
    }

    /// Current lifecycle phase.
    pub async fn phase(&self) -> SyncPhase {
        *self.phase.read().await
    }

    /// Run one pass over the given streams.
    ///
    /// Every fetch goes through the governor under the stream's operation
    /// key with fail-fast rate limiting; a throttled or tripped stream
    /// records its rejection like any other stream failure.
    ///
    /// `success` on the returned result is false only when every stream
    /// failed at stream level. A pass over zero streams succeeds trivially.
    #[instrument(skip(self, streams, options), fields(provider = %self.provider))]
    pub async fn run(
        &self,
        streams: &[Arc<dyn ResourceStream>],
        options: &SyncOptions,
    ) -> Result<SyncResult, SyncError> {
        *self.phase.write().await = SyncPhase::Running;

        let mut outcomes = join_all(
            streams
                .iter()
                .map(|stream| self.sync_stream(stream.as_ref(), options)),
        )
        .await;

        if let Some(position) = outcomes.iter().position(|o| o.auth_failure.is_some()) {
            let source = outcomes
                .swap_remove(position)
                .auth_failure
                .unwrap_or(ConnectorError::CredentialsExpired);
            *self.phase.write().await = SyncPhase::PartiallyFailed;
            warn!(error = %source, "sync pass aborted, authentication invalid");
            return Err(SyncError::Unauthenticated { source });
        }

        let total_streams = outcomes.len();
        let failed_streams = outcomes.iter().filter(|o| o.failed).count();
        let success = failed_streams < total_streams || total_streams == 0;

        let mut items_processed = 0u64;
        let mut items_skipped = 0u64;
        let mut errors = Vec::new();
        for outcome in outcomes {
            items_processed += outcome.processed;
            items_skipped += outcome.skipped;
            errors.extend(outcome.errors);
        }

        let phase = if errors.is_empty() {
            SyncPhase::Completed
        } else {
            SyncPhase::PartiallyFailed
        };
        *self.phase.write().await = phase;

        info!(
            streams = total_streams,
            failed_streams,
            items_processed,
            items_skipped,
            error_count = errors.len(),
            success,
            "sync pass finished"
        );

        Ok(SyncResult {
            success,
            items_processed,
            items_skipped,
            errors,
            metadata: SyncMetadata {
                synced_at: Utc::now(),
                provider: self.provider.clone(),
            },
        })
    }

    /// Drive one stream through pagination and application.
    async fn sync_stream(
        &self,
        stream: &dyn ResourceStream,
        options: &SyncOptions,
    ) -> StreamOutcome {
        let mut outcome = StreamOutcome::new(stream.resource_type());
        let key = GovernorKey::new(self.provider.clone(), stream.operation_key());
        let mut cursor: Option<String> = None;

        loop {
            let fetched: ConnectorResult<ResourcePage> = self
                .governor
                .execute(&key, RatePolicy::FailFast, || {
                    stream.fetch_page(cursor.as_deref())
                })
                .await;

            let page = match fetched {
                Ok(page) => page,
                Err(err) => {
                    if matches!(
                        err,
                        ConnectorError::AuthenticationFailed { .. }
                            | ConnectorError::CredentialsExpired
                    ) {
                        outcome.auth_failure = Some(err);
                    } else {
                        warn!(
                            resource_type = %outcome.resource_type,
                            error = %err,
                            "stream failed"
                        );
                        outcome.record_stream_failure(&err);
                    }
                    return outcome;
                }
            };

            for record in &page.records {
                let skip = match (options.last_sync_time, record.modified_at) {
                    (Some(last), Some(modified)) => modified <= last,
                    _ => false,
                };
                if skip {
                    outcome.skipped += 1;
                    continue;
                }

                // Item-level failures count as processed; they are recorded,
                // not retried, and never abort the stream.
                if let Err(err) = stream.apply(record).await {
                    outcome.errors.push(format!(
                        "{} item {} failed: {}",
                        outcome.resource_type, record.id, err
                    ));
                }
                outcome.processed += 1;
            }

            debug!(
                resource_type = %outcome.resource_type,
                processed = outcome.processed,
                skipped = outcome.skipped,
                "page consumed"
            );

            match page.next_page {
                Some(next) => cursor = Some(next),
                None => return outcome,
            }
        }
    }
}
