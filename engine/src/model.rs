//! Core entities: notifications and per-recipient delivery logs.
//!
//! Statuses are explicit tagged variants with an enforced transition table
//! rather than free-form strings, so that:
//! 1. Every status change is validated at the store boundary.
//! 2. Terminal statuses are sticky: no event can move a log out of
//!    Acknowledged, Failed, TimedOut, or Escalated.
//! 3. Offline replay of a notification's log history always walks a legal
//!    path.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a notification instance.
pub type NotificationId = String;
/// Unique identifier for a per-recipient log row.
pub type LogId = String;
/// Unique identifier for a calling tree.
pub type TreeId = String;
/// Unique identifier for a node within a calling tree.
pub type NodeId = String;
/// Unique identifier for a team member (recipient).
pub type MemberId = String;

/// Generate a fresh entity id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Broadcast priority. Informational only: it travels with every dispatch
/// but never alters escalation mechanics.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    #[default]
    High,
    Critical,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

/// Lifecycle of a notification instance.
///
/// ```text
/// Pending → InProgress → Completed
///                      → Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    /// Created but not yet dispatched.
    Pending,
    /// At least one level has been dispatched and is awaiting responses.
    InProgress,
    /// A level was fully acknowledged. Terminal.
    Completed,
    /// Every level exhausted without acknowledgment. Terminal.
    Failed,
}

impl NotificationStatus {
    /// Whether this status permits no further mutation.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Legal notification status transitions.
pub fn notification_transition_allowed(from: NotificationStatus, to: NotificationStatus) -> bool {
    use NotificationStatus::*;
    matches!(
        (from, to),
        (Pending, InProgress) | (Pending, Failed) | (InProgress, Completed) | (InProgress, Failed)
    )
}

/// Per-recipient delivery/acknowledgment status.
///
/// The success path is `Pending → Sent → Delivered → Acknowledged`; any
/// non-terminal status may instead end in `Failed` (dispatch exhausted),
/// `TimedOut` (response window expired), or `Escalated` (manual override
/// moved past this level).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    Pending,
    Sent,
    Delivered,
    Acknowledged,
    Failed,
    #[serde(rename = "timeout")]
    TimedOut,
    Escalated,
}

impl LogStatus {
    /// Whether this status permits no further transition.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Acknowledged | Self::Failed | Self::TimedOut | Self::Escalated
        )
    }

    /// Whether a recipient in this status can still acknowledge.
    pub fn is_open(self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for LogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Sent => write!(f, "sent"),
            Self::Delivered => write!(f, "delivered"),
            Self::Acknowledged => write!(f, "acknowledged"),
            Self::Failed => write!(f, "failed"),
            Self::TimedOut => write!(f, "timeout"),
            Self::Escalated => write!(f, "escalated"),
        }
    }
}

/// Legal log status transitions. Terminal statuses have no outgoing edges.
pub fn log_transition_allowed(from: LogStatus, to: LogStatus) -> bool {
    use LogStatus::*;

    if from.is_terminal() || from == to {
        return false;
    }

    matches!(
        (from, to),
        (Pending, Sent)
            | (Pending, Failed)
            | (Pending, TimedOut)
            | (Pending, Escalated)
            | (Sent, Delivered)
            | (Sent, Acknowledged)
            | (Sent, Failed)
            | (Sent, TimedOut)
            | (Sent, Escalated)
            | (Delivered, Acknowledged)
            | (Delivered, Failed)
            | (Delivered, TimedOut)
            | (Delivered, Escalated)
    )
}

/// Why a level was escalated past.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationCause {
    /// The response window expired.
    Timeout,
    /// An authorized operator moved past the level before the window expired.
    Manual,
}

impl fmt::Display for EscalationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// One emergency broadcast instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub tree_id: TreeId,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub status: NotificationStatus,
    pub initiated_by: Option<MemberId>,
    pub initiated_at: DateTime<Utc>,
    /// Set when the notification reaches a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Level count of the tree, snapshotted at trigger time so status reads
    /// never depend on the live tree.
    pub total_levels: u32,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Notification {
    /// Whether no further mutation is permitted.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// One row per recipient per level per notification. Never deleted; the set
/// of log rows is the append-only history of the broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationLog {
    pub id: LogId,
    pub notification_id: NotificationId,
    /// Tree node this recipient occupied in the membership snapshot.
    pub node_id: NodeId,
    pub member_id: MemberId,
    pub level: u32,
    pub status: LogStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    /// Free-text response captured with the acknowledgment.
    pub response: Option<String>,
    /// Node at the next level this recipient's failure escalated toward.
    pub escalated_to: Option<NodeId>,
    pub created_at: DateTime<Utc>,
}

impl NotificationLog {
    /// A log created at level-dispatch time: the recipient has just been
    /// handed to the notifier, so the row starts in `Sent`.
    pub fn sent(
        notification_id: &str,
        node_id: &str,
        member_id: &str,
        level: u32,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_id(),
            notification_id: notification_id.to_string(),
            node_id: node_id.to_string(),
            member_id: member_id.to_string(),
            level,
            status: LogStatus::Sent,
            sent_at: Some(at),
            delivered_at: None,
            acknowledged_at: None,
            response: None,
            escalated_to: None,
            created_at: at,
        }
    }

    /// Apply a validated transition, stamping the timestamp field that
    /// belongs to the new status. Callers must have checked
    /// [`log_transition_allowed`] first.
    pub fn apply_transition(
        &mut self,
        to: LogStatus,
        at: DateTime<Utc>,
        response: Option<String>,
        escalated_to: Option<NodeId>,
    ) {
        self.status = to;
        match to {
            LogStatus::Sent => self.sent_at = Some(at),
            LogStatus::Delivered => self.delivered_at = Some(at),
            LogStatus::Acknowledged => {
                self.acknowledged_at = Some(at);
                if response.is_some() {
                    self.response = response;
                }
            }
            LogStatus::TimedOut | LogStatus::Escalated => {
                if escalated_to.is_some() {
                    self.escalated_to = escalated_to;
                }
            }
            LogStatus::Pending | LogStatus::Failed => {}
        }
    }
}

/// A notification together with its full ordered log history, for timeline
/// rendering by read consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationWithLogs {
    pub notification: Notification,
    /// Ordered by level, then creation time.
    pub logs: Vec<NotificationLog>,
}

/// Derived current level: the highest level dispatched so far. Exactly one
/// level is ever active, levels below it are already resolved (timed out,
/// escalated, or the notification would be terminal), so the newest
/// dispatched level is the one still being worked. Never stored; always
/// recomputed from log state. `None` only before any dispatch; callers
/// treat a terminal notification as having no current level.
pub fn derive_current_level(logs: &[NotificationLog]) -> Option<u32> {
    logs.iter().map(|l| l.level).max()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::Medium < Priority::High);
        assert!(Priority::High < Priority::Critical);
        assert_eq!(Priority::default(), Priority::High);
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!("critical".parse::<Priority>().unwrap(), Priority::Critical);
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_notification_transitions() {
        use NotificationStatus::*;
        assert!(notification_transition_allowed(Pending, InProgress));
        assert!(notification_transition_allowed(InProgress, Completed));
        assert!(notification_transition_allowed(InProgress, Failed));
        assert!(!notification_transition_allowed(Completed, Failed));
        assert!(!notification_transition_allowed(Failed, InProgress));
        assert!(!notification_transition_allowed(Completed, InProgress));
    }

    #[test]
    fn test_log_success_path_is_legal() {
        use LogStatus::*;
        assert!(log_transition_allowed(Pending, Sent));
        assert!(log_transition_allowed(Sent, Delivered));
        assert!(log_transition_allowed(Delivered, Acknowledged));
        assert!(log_transition_allowed(Sent, Acknowledged));
    }

    #[test]
    fn test_terminal_log_statuses_are_sticky() {
        use LogStatus::*;
        for terminal in [Acknowledged, Failed, TimedOut, Escalated] {
            for to in [Pending, Sent, Delivered, Acknowledged, Failed, TimedOut, Escalated] {
                assert!(
                    !log_transition_allowed(terminal, to),
                    "{} -> {} must be illegal",
                    terminal,
                    to
                );
            }
        }
    }

    #[test]
    fn test_no_regression_to_pending() {
        use LogStatus::*;
        assert!(!log_transition_allowed(Sent, Pending));
        assert!(!log_transition_allowed(Delivered, Sent));
    }

    #[test]
    fn test_log_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&LogStatus::TimedOut).unwrap(),
            "\"timeout\""
        );
        assert_eq!(
            serde_json::to_string(&LogStatus::Acknowledged).unwrap(),
            "\"acknowledged\""
        );
        let parsed: LogStatus = serde_json::from_str("\"timeout\"").unwrap();
        assert_eq!(parsed, LogStatus::TimedOut);
    }

    #[test]
    fn test_apply_transition_stamps_timestamps() {
        let t0 = Utc::now();
        let mut log = NotificationLog::sent("n-1", "node-1", "alice", 1, t0);
        assert_eq!(log.sent_at, Some(t0));

        let t1 = Utc::now();
        log.apply_transition(LogStatus::Delivered, t1, None, None);
        assert_eq!(log.delivered_at, Some(t1));

        let t2 = Utc::now();
        log.apply_transition(LogStatus::Acknowledged, t2, Some("on my way".into()), None);
        assert_eq!(log.acknowledged_at, Some(t2));
        assert_eq!(log.response.as_deref(), Some("on my way"));
    }

    #[test]
    fn test_derive_current_level() {
        let now = Utc::now();
        let mut l1a = NotificationLog::sent("n-1", "node-1", "alice", 1, now);
        let mut l1b = NotificationLog::sent("n-1", "node-2", "bob", 1, now);
        let l2c = NotificationLog::sent("n-1", "node-3", "carol", 2, now);

        // Only level 1 dispatched
        assert_eq!(derive_current_level(&[l1a.clone(), l1b.clone()]), Some(1));

        // Level 1 escalated past, level 2 dispatched: level 2 is current
        l1a.apply_transition(LogStatus::TimedOut, now, None, None);
        l1b.apply_transition(LogStatus::TimedOut, now, None, None);
        assert_eq!(
            derive_current_level(&[l1a.clone(), l1b.clone(), l2c]),
            Some(2)
        );

        // A level stays current while resolved-but-incomplete (acknowledged
        // plus failed recipients) until escalation moves past it.
        assert_eq!(derive_current_level(&[l1a, l1b]), Some(1));
        assert_eq!(derive_current_level(&[]), None);
    }
}
