//! Error types for sync orchestration.

use thiserror::Error;

use nexum_connector::error::ConnectorError;
use nexum_connector::ids::ProviderId;
use nexum_connector::types::SyncResult;

/// Errors that abort a sync pass outright.
///
/// Ordinary stream failures do not land here; they are aggregated into the
/// returned [`SyncResult`]. A pass errors when authentication fails partway
/// through, or when [`into_result`] turns a finished pass with every stream
/// failed into an error.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Credentials were invalid or expired; the pass was abandoned once
    /// in-flight streams settled.
    #[error("sync aborted, authentication invalid: {source}")]
    Unauthenticated {
        /// The credential failure that aborted the pass.
        #[source]
        source: ConnectorError,
    },

    /// Every stream in the pass failed at stream level.
    #[error("all {stream_count} sync streams failed for provider '{provider}'")]
    AllStreamsFailed {
        /// Provider the pass ran against.
        provider: ProviderId,
        /// Number of streams that failed.
        stream_count: usize,
        /// The aggregated result, errors included.
        result: SyncResult,
    },
}

/// Convert an aggregated result into `Result` semantics.
///
/// The orchestrator itself always returns the result object; callers that
/// want total failure surfaced as an error use this instead of inspecting
/// `success` by hand.
pub fn into_result(
    provider: &ProviderId,
    stream_count: usize,
    result: SyncResult,
) -> Result<SyncResult, SyncError> {
    if result.success {
        Ok(result)
    } else {
        Err(SyncError::AllStreamsFailed {
            provider: provider.clone(),
            stream_count,
            result,
        })
    }
}
