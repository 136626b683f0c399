//! Status projector: aggregate progress computed from a notification's log
//! set. Pure function over a point-in-time snapshot; it is never in the
//! write path and holds no running totals.

use serde::{Deserialize, Serialize};

use crate::model::{derive_current_level, LogStatus, Notification, NotificationLog};

/// Aggregate progress of one notification, for read consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    /// Level currently being worked (the highest dispatched so far);
    /// `None` once the notification is terminal.
    pub current_level: Option<u32>,
    pub total_levels: u32,
    /// Logs that ever reached Sent or later.
    pub total_sent: u32,
    pub total_acknowledged: u32,
    /// Logs still awaiting a response (Pending, Sent, or Delivered).
    pub total_pending: u32,
    /// Acknowledged share of all dispatched logs, rounded down.
    pub progress_percentage: u8,
}

/// Project the summary from a consistent snapshot of the notification and
/// its logs.
pub fn project(notification: &Notification, logs: &[NotificationLog]) -> StatusSummary {
    let current_level = if notification.is_terminal() {
        None
    } else {
        derive_current_level(logs)
    };

    let total_sent = logs.iter().filter(|l| l.sent_at.is_some()).count() as u32;
    let total_acknowledged = logs
        .iter()
        .filter(|l| l.status == LogStatus::Acknowledged)
        .count() as u32;
    let total_pending = logs.iter().filter(|l| l.status.is_open()).count() as u32;

    let progress_percentage = if logs.is_empty() {
        0
    } else {
        (total_acknowledged as u64 * 100 / logs.len() as u64) as u8
    };

    StatusSummary {
        current_level,
        total_levels: notification.total_levels,
        total_sent,
        total_acknowledged,
        total_pending,
        progress_percentage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NotificationStatus, Priority};
    use chrono::Utc;
    use std::collections::HashMap;

    fn notification(status: NotificationStatus) -> Notification {
        Notification {
            id: "n-1".to_string(),
            tree_id: "tree-1".to_string(),
            title: "Drill".to_string(),
            message: "This is a drill".to_string(),
            priority: Priority::High,
            status,
            initiated_by: None,
            initiated_at: Utc::now(),
            completed_at: None,
            total_levels: 2,
            metadata: HashMap::new(),
        }
    }

    fn log(member: &str, level: u32, status: LogStatus) -> NotificationLog {
        let mut log = NotificationLog::sent("n-1", &format!("node-{}", member), member, level, Utc::now());
        if status != LogStatus::Sent {
            log.apply_transition(status, Utc::now(), None, None);
        }
        log
    }

    #[test]
    fn test_empty_log_set() {
        let summary = project(&notification(NotificationStatus::InProgress), &[]);
        assert_eq!(summary.current_level, None);
        assert_eq!(summary.total_sent, 0);
        assert_eq!(summary.progress_percentage, 0);
    }

    #[test]
    fn test_partial_acknowledgment() {
        let logs = vec![
            log("alice", 1, LogStatus::Acknowledged),
            log("bob", 1, LogStatus::Sent),
            log("carol", 1, LogStatus::Delivered),
        ];
        let summary = project(&notification(NotificationStatus::InProgress), &logs);

        assert_eq!(summary.current_level, Some(1));
        assert_eq!(summary.total_levels, 2);
        assert_eq!(summary.total_sent, 3);
        assert_eq!(summary.total_acknowledged, 1);
        assert_eq!(summary.total_pending, 2);
        // 1/3 rounds down
        assert_eq!(summary.progress_percentage, 33);
    }

    #[test]
    fn test_escalated_history_counts_both_levels() {
        let logs = vec![
            log("alice", 1, LogStatus::TimedOut),
            log("bob", 1, LogStatus::TimedOut),
            log("carol", 2, LogStatus::Sent),
        ];
        let summary = project(&notification(NotificationStatus::InProgress), &logs);

        assert_eq!(summary.current_level, Some(2));
        assert_eq!(summary.total_sent, 3);
        assert_eq!(summary.total_pending, 1);
        assert_eq!(summary.progress_percentage, 0);
    }

    #[test]
    fn test_terminal_notification_has_no_current_level() {
        let logs = vec![
            log("alice", 1, LogStatus::Acknowledged),
            log("bob", 1, LogStatus::Acknowledged),
        ];
        let summary = project(&notification(NotificationStatus::Completed), &logs);

        assert_eq!(summary.current_level, None);
        assert_eq!(summary.total_acknowledged, 2);
        assert_eq!(summary.progress_percentage, 100);
    }
}
