//! Notification store: the single source of truth for notifications, their
//! per-recipient logs, and armed timer deadlines.
//!
//! The engine holds no authoritative in-memory state; every cross-cutting
//! mutation goes through the store's conditional-update primitives so that
//! concurrent writers (acknowledgments, timer fires, manual escalations)
//! resolve to exactly one winner.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    LogStatus, NodeId, Notification, NotificationId, NotificationLog, NotificationStatus,
};

mod memory;
pub use memory::InMemoryStore;

#[cfg(feature = "durable-state")]
mod schema;
#[cfg(feature = "durable-state")]
mod durable;
#[cfg(feature = "durable-state")]
pub use durable::DurableStore;

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("lock poisoned")]
    LockPoisoned,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of a conditional log update. The returned row is the post-update
/// state on success and the untouched current state on rejection, so racing
/// callers always observe what actually won.
#[derive(Debug, Clone)]
pub enum CasOutcome {
    /// The transition was applied.
    Applied(NotificationLog),
    /// The log was not in any of the expected statuses; nothing changed.
    Rejected(NotificationLog),
}

impl CasOutcome {
    pub fn applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    pub fn log(&self) -> &NotificationLog {
        match self {
            Self::Applied(log) | Self::Rejected(log) => log,
        }
    }
}

/// Persisted escalation deadline for one in-flight notification. The
/// scheduler's in-memory registry is a cache over these records; after a
/// restart the registry is rebuilt from them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerRecord {
    pub notification_id: NotificationId,
    pub level: u32,
    /// Monotonic arming epoch; a record with a lower epoch is stale.
    pub epoch: u64,
    pub deadline: DateTime<Utc>,
}

/// Durable record of notifications and their logs, with atomic conditional
/// updates.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()>;

    async fn get_notification(&self, id: &str) -> StoreResult<Option<Notification>>;

    /// Compare-and-set on the notification status. Returns whether the
    /// transition was applied; `completed_at` is stamped only on success.
    /// Implementations must also reject transitions the status state
    /// machine forbids.
    async fn compare_and_set_notification_status(
        &self,
        id: &str,
        expected: &[NotificationStatus],
        new: NotificationStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<bool>;

    /// Insert the logs for a freshly dispatched level.
    async fn insert_logs(&self, logs: &[NotificationLog]) -> StoreResult<()>;

    /// All logs for a notification, ordered by level then creation.
    async fn logs_for_notification(&self, id: &str) -> StoreResult<Vec<NotificationLog>>;

    /// Logs at one level, in dispatch (position) order.
    async fn logs_at_level(&self, id: &str, level: u32) -> StoreResult<Vec<NotificationLog>>;

    /// Atomic conditional update of a log's status. The transition is
    /// applied only when the current status is one of `expected` AND the
    /// log transition table allows `current -> new`; otherwise the call is
    /// rejected with the current row. At most one of several racing callers
    /// can win.
    async fn compare_and_set_log_status(
        &self,
        log_id: &str,
        expected: &[LogStatus],
        new: LogStatus,
        at: DateTime<Utc>,
        response: Option<String>,
        escalated_to: Option<NodeId>,
    ) -> StoreResult<CasOutcome>;

    /// Record (or replace) the armed timer for a notification.
    async fn put_timer(&self, record: &TimerRecord) -> StoreResult<()>;

    /// Drop the armed timer for a notification. Not an error if none exists.
    async fn remove_timer(&self, notification_id: &str) -> StoreResult<()>;

    /// All armed timers, for scheduler reconstruction after a restart.
    async fn list_timers(&self) -> StoreResult<Vec<TimerRecord>>;
}
