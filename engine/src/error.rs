//! Crate-wide error taxonomy for the escalation engine.
//!
//! NotFound variants surface to the caller and are never retried.
//! `NotificationTerminal` rejects user-initiated misuse of a finished
//! notification; the race-prone equivalents (a stale escalation, a timer
//! firing after cancellation) are benign no-ops and never reach this type.
//! Dispatch failures are recorded on the affected log and deliberately have
//! no variant here. Store failures are retried with bounded backoff at the
//! call site and propagate through `Store` once retries exhaust.

use thiserror::Error;

use crate::model::{MemberId, NotificationId, TreeId};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("calling tree not found: {0}")]
    TreeNotFound(TreeId),

    #[error("calling tree {0} is not active")]
    TreeNotActive(TreeId),

    #[error("notification not found: {0}")]
    NotificationNotFound(NotificationId),

    #[error("member {member} has no open log at level {level}")]
    NotFoundAtCurrentLevel { member: MemberId, level: u32 },

    #[error("notification {0} is terminal; no further mutation is permitted")]
    NotificationTerminal(NotificationId),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
