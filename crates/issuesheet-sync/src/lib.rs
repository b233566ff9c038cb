//! Reconciliation between the issues sheet and the GitHub repository.
//!
//! `EventDispatcher` routes sheet edits and webhook deliveries to
//! `SheetSyncEngine`, which reads tracker state through `IssueTracker` and
//! mutates rows located by `RowIndex`.

pub mod dispatcher;
pub mod engine;
pub mod format;
pub mod row_index;
pub mod webhook;

pub use dispatcher::{Dispatch, EventDispatcher, SheetEdit};
pub use engine::{SheetSyncEngine, SyncOutcome};
pub use row_index::RowIndex;
pub use webhook::{compute_signature, verify_signature, IssueAction, WebhookPayload};
