//! Event types emitted as a notification moves through its lifecycle.
//!
//! These drive the pub/sub surface that realtime consumers (status pages,
//! timeline views) subscribe to. They mirror log/notification state and
//! never carry authority of their own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    EscalationCause, LogStatus, MemberId, NotificationId, TreeId,
};

/// All notification lifecycle events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// A broadcast was initiated.
    Triggered {
        notification_id: NotificationId,
        tree_id: TreeId,
        timestamp: DateTime<Utc>,
    },

    /// A level's membership was snapshotted and handed to the notifier.
    LevelDispatched {
        notification_id: NotificationId,
        level: u32,
        recipients: u32,
        timestamp: DateTime<Utc>,
    },

    /// One recipient's log changed status (delivery confirmed, dispatch
    /// failed, marked timed out, ...).
    LogStatusChanged {
        notification_id: NotificationId,
        member_id: MemberId,
        level: u32,
        status: LogStatus,
        timestamp: DateTime<Utc>,
    },

    /// A recipient acknowledged.
    Acknowledged {
        notification_id: NotificationId,
        member_id: MemberId,
        level: u32,
        timestamp: DateTime<Utc>,
    },

    /// A level was escalated past; `to_level` is `None` when no populated
    /// level remained.
    LevelEscalated {
        notification_id: NotificationId,
        from_level: u32,
        to_level: Option<u32>,
        cause: EscalationCause,
        timestamp: DateTime<Utc>,
    },

    /// A level was fully acknowledged; the notification is done.
    Completed {
        notification_id: NotificationId,
        timestamp: DateTime<Utc>,
    },

    /// Every level exhausted without acknowledgment.
    Failed {
        notification_id: NotificationId,
        timestamp: DateTime<Utc>,
    },
}

impl NotificationEvent {
    /// Stable event type tag, matching the serialized `type` field.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Triggered { .. } => "triggered",
            Self::LevelDispatched { .. } => "level_dispatched",
            Self::LogStatusChanged { .. } => "log_status_changed",
            Self::Acknowledged { .. } => "acknowledged",
            Self::LevelEscalated { .. } => "level_escalated",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }

    /// Notification this event belongs to.
    pub fn notification_id(&self) -> &str {
        match self {
            Self::Triggered { notification_id, .. }
            | Self::LevelDispatched { notification_id, .. }
            | Self::LogStatusChanged { notification_id, .. }
            | Self::Acknowledged { notification_id, .. }
            | Self::LevelEscalated { notification_id, .. }
            | Self::Completed { notification_id, .. }
            | Self::Failed { notification_id, .. } => notification_id,
        }
    }

    /// When the event occurred.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Triggered { timestamp, .. }
            | Self::LevelDispatched { timestamp, .. }
            | Self::LogStatusChanged { timestamp, .. }
            | Self::Acknowledged { timestamp, .. }
            | Self::LevelEscalated { timestamp, .. }
            | Self::Completed { timestamp, .. }
            | Self::Failed { timestamp, .. } => *timestamp,
        }
    }

    /// Whether this event ends the notification's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}
