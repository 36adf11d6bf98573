//! # Sync Orchestration
//!
//! Drives one provider's resource streams through paginated, incremental
//! sync passes and aggregates their outcomes with partial-failure
//! tolerance.
//!
//! ## Key Components
//!
//! - [`ResourceStream`] - Trait for one paginated resource type feed
//! - [`SyncOrchestrator`] - Runs streams concurrently and aggregates results
//! - [`SyncPhase`] - Lifecycle of a pass
//! - [`SyncError`] - The abort paths (invalid auth, total failure)
//!
//! ## Pass Flow
//!
//! ```text
//! ┌──────────────────┐      ┌────────────────────┐
//! │ SyncOrchestrator │─────►│ ResilienceGovernor │ admission per
//! │      run()       │      │  (rate + circuit)  │ (provider, operation)
//! └────────┬─────────┘      └────────────────────┘
//!          │ concurrent, independently failing
//!    ┌─────┼──────────┐
//!    ▼     ▼          ▼
//! ┌──────┐ ┌──────┐ ┌──────┐
//! │stream│ │stream│ │stream│   fetch_page → cursor skip → apply
//! └──┬───┘ └──┬───┘ └──┬───┘
//!    └────────┼────────┘
//!             ▼
//!       ┌────────────┐
//!       │ SyncResult │   processed / skipped / errors[] / success
//!       └────────────┘
//! ```
//!
//! ## Partial Failure
//!
//! A stream that errors at stream level becomes an entry in
//! `SyncResult.errors` while its siblings keep running; `success` only
//! drops to `false` when every stream failed. Item-level failures are
//! recorded the same way without counting as stream failures.
//!
//! ## Example
//!
//! ```ignore
//! use nexum_sync::{SyncOrchestrator, ResourceStream};
//! use nexum_connector::prelude::*;
//!
//! let governor = Arc::new(ResilienceGovernor::with_defaults());
//! let orchestrator = SyncOrchestrator::new("acme".parse()?, governor);
//!
//! let result = orchestrator
//!     .run(&streams, &SyncOptions::since(last_pass))
//!     .await?;
//! if !result.success {
//!     // every stream failed; errors[] has one entry per stream
//! }
//! ```

pub mod error;
pub mod orchestrator;
pub mod stream;

pub use error::{into_result, SyncError};
pub use orchestrator::{SyncOrchestrator, SyncPhase};
pub use stream::{ResourcePage, ResourceRecord, ResourceStream};
