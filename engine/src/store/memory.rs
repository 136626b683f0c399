//! In-process notification store, the reference implementation.
//!
//! Conditional updates are serialized through a single `RwLock` write
//! section, giving the same at-most-one-winner guarantee a database-level
//! conditional update would. State does not survive a process restart; the
//! `durable-state` feature provides the persistent variant.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{
    log_transition_allowed, notification_transition_allowed, LogId, LogStatus, NodeId,
    Notification, NotificationId, NotificationLog, NotificationStatus,
};

use super::{CasOutcome, NotificationStore, StoreError, StoreResult, TimerRecord};

#[derive(Default)]
struct Inner {
    notifications: HashMap<NotificationId, Notification>,
    logs: HashMap<LogId, NotificationLog>,
    /// Log ids per notification in insertion (dispatch) order.
    by_notification: HashMap<NotificationId, Vec<LogId>>,
    timers: HashMap<NotificationId, TimerRecord>,
}

/// Shared in-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this store.
    pub fn shared(self) -> std::sync::Arc<Self> {
        std::sync::Arc::new(self)
    }
}

#[async_trait]
impl NotificationStore for InMemoryStore {
    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()> {
        let mut inner = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        inner
            .notifications
            .insert(notification.id.clone(), notification.clone());
        Ok(())
    }

    async fn get_notification(&self, id: &str) -> StoreResult<Option<Notification>> {
        let inner = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(inner.notifications.get(id).cloned())
    }

    async fn compare_and_set_notification_status(
        &self,
        id: &str,
        expected: &[NotificationStatus],
        new: NotificationStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<bool> {
        let mut inner = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        let notification = inner
            .notifications
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("notification {}", id)))?;

        if !expected.contains(&notification.status)
            || !notification_transition_allowed(notification.status, new)
        {
            return Ok(false);
        }

        notification.status = new;
        if completed_at.is_some() {
            notification.completed_at = completed_at;
        }
        Ok(true)
    }

    async fn insert_logs(&self, logs: &[NotificationLog]) -> StoreResult<()> {
        let mut inner = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        for log in logs {
            inner
                .by_notification
                .entry(log.notification_id.clone())
                .or_default()
                .push(log.id.clone());
            inner.logs.insert(log.id.clone(), log.clone());
        }
        Ok(())
    }

    async fn logs_for_notification(&self, id: &str) -> StoreResult<Vec<NotificationLog>> {
        let inner = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut logs: Vec<NotificationLog> = inner
            .by_notification
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|log_id| inner.logs.get(log_id).cloned())
            .collect();
        logs.sort_by(|a, b| {
            (a.level, a.created_at, &a.id).cmp(&(b.level, b.created_at, &b.id))
        });
        Ok(logs)
    }

    async fn logs_at_level(&self, id: &str, level: u32) -> StoreResult<Vec<NotificationLog>> {
        let inner = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(inner
            .by_notification
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|log_id| inner.logs.get(log_id))
            .filter(|log| log.level == level)
            .cloned()
            .collect())
    }

    async fn compare_and_set_log_status(
        &self,
        log_id: &str,
        expected: &[LogStatus],
        new: LogStatus,
        at: DateTime<Utc>,
        response: Option<String>,
        escalated_to: Option<NodeId>,
    ) -> StoreResult<CasOutcome> {
        let mut inner = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        let log = inner
            .logs
            .get_mut(log_id)
            .ok_or_else(|| StoreError::NotFound(format!("log {}", log_id)))?;

        if !expected.contains(&log.status) || !log_transition_allowed(log.status, new) {
            return Ok(CasOutcome::Rejected(log.clone()));
        }

        log.apply_transition(new, at, response, escalated_to);
        Ok(CasOutcome::Applied(log.clone()))
    }

    async fn put_timer(&self, record: &TimerRecord) -> StoreResult<()> {
        let mut inner = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        inner
            .timers
            .insert(record.notification_id.clone(), record.clone());
        Ok(())
    }

    async fn remove_timer(&self, notification_id: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        inner.timers.remove(notification_id);
        Ok(())
    }

    async fn list_timers(&self) -> StoreResult<Vec<TimerRecord>> {
        let inner = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(inner.timers.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Priority;
    use std::collections::HashMap as StdHashMap;

    fn notification(id: &str) -> Notification {
        Notification {
            id: id.to_string(),
            tree_id: "tree-1".to_string(),
            title: "Pipe burst".to_string(),
            message: "Report to site B".to_string(),
            priority: Priority::High,
            status: NotificationStatus::InProgress,
            initiated_by: Some("ops".to_string()),
            initiated_at: Utc::now(),
            completed_at: None,
            total_levels: 2,
            metadata: StdHashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_notification_roundtrip() {
        let store = InMemoryStore::new();
        store.insert_notification(&notification("n-1")).await.unwrap();

        let loaded = store.get_notification("n-1").await.unwrap().unwrap();
        assert_eq!(loaded.title, "Pipe burst");
        assert!(store.get_notification("n-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_notification_cas_guards_expected_and_table() {
        let store = InMemoryStore::new();
        store.insert_notification(&notification("n-1")).await.unwrap();

        // Expected status mismatch
        let applied = store
            .compare_and_set_notification_status(
                "n-1",
                &[NotificationStatus::Pending],
                NotificationStatus::Completed,
                None,
            )
            .await
            .unwrap();
        assert!(!applied);

        // Legal transition
        let now = Utc::now();
        let applied = store
            .compare_and_set_notification_status(
                "n-1",
                &[NotificationStatus::InProgress],
                NotificationStatus::Completed,
                Some(now),
            )
            .await
            .unwrap();
        assert!(applied);

        let loaded = store.get_notification("n-1").await.unwrap().unwrap();
        assert_eq!(loaded.status, NotificationStatus::Completed);
        assert_eq!(loaded.completed_at, Some(now));

        // Terminal: no further transition even when "expected" matches
        let applied = store
            .compare_and_set_notification_status(
                "n-1",
                &[NotificationStatus::Completed],
                NotificationStatus::Failed,
                None,
            )
            .await
            .unwrap();
        assert!(!applied);
    }

    #[tokio::test]
    async fn test_log_cas_single_winner() {
        let store = InMemoryStore::new();
        store.insert_notification(&notification("n-1")).await.unwrap();
        let log = NotificationLog::sent("n-1", "node-1", "alice", 1, Utc::now());
        let log_id = log.id.clone();
        store.insert_logs(&[log]).await.unwrap();

        let first = store
            .compare_and_set_log_status(
                &log_id,
                &[LogStatus::Sent, LogStatus::Delivered],
                LogStatus::Acknowledged,
                Utc::now(),
                Some("ok".into()),
                None,
            )
            .await
            .unwrap();
        assert!(first.applied());

        // The duplicate observes the already-applied result and changes
        // nothing.
        let second = store
            .compare_and_set_log_status(
                &log_id,
                &[LogStatus::Sent, LogStatus::Delivered],
                LogStatus::Acknowledged,
                Utc::now(),
                Some("late".into()),
                None,
            )
            .await
            .unwrap();
        assert!(!second.applied());
        assert_eq!(second.log().status, LogStatus::Acknowledged);
        assert_eq!(second.log().response.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn test_log_cas_rejects_illegal_transition() {
        let store = InMemoryStore::new();
        let mut log = NotificationLog::sent("n-1", "node-1", "alice", 1, Utc::now());
        log.apply_transition(LogStatus::TimedOut, Utc::now(), None, None);
        let log_id = log.id.clone();
        store.insert_logs(&[log]).await.unwrap();

        // TimedOut is terminal: even listing it as expected cannot move it.
        let outcome = store
            .compare_and_set_log_status(
                &log_id,
                &[LogStatus::TimedOut],
                LogStatus::Acknowledged,
                Utc::now(),
                None,
                None,
            )
            .await
            .unwrap();
        assert!(!outcome.applied());
        assert_eq!(outcome.log().status, LogStatus::TimedOut);
    }

    #[tokio::test]
    async fn test_logs_ordered_by_level() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let l2 = NotificationLog::sent("n-1", "node-3", "carol", 2, now);
        let l1a = NotificationLog::sent("n-1", "node-1", "alice", 1, now);
        let l1b = NotificationLog::sent("n-1", "node-2", "bob", 1, now);
        store.insert_logs(&[l2, l1a, l1b]).await.unwrap();

        let logs = store.logs_for_notification("n-1").await.unwrap();
        let levels: Vec<u32> = logs.iter().map(|l| l.level).collect();
        assert_eq!(levels, vec![1, 1, 2]);

        let level_one = store.logs_at_level("n-1", 1).await.unwrap();
        assert_eq!(level_one.len(), 2);
        // Dispatch order is preserved within a level.
        assert_eq!(level_one[0].member_id, "alice");
        assert_eq!(level_one[1].member_id, "bob");
    }

    #[tokio::test]
    async fn test_timer_records() {
        let store = InMemoryStore::new();
        let record = TimerRecord {
            notification_id: "n-1".to_string(),
            level: 1,
            epoch: 1,
            deadline: Utc::now(),
        };
        store.put_timer(&record).await.unwrap();

        let replacement = TimerRecord {
            level: 2,
            epoch: 2,
            ..record.clone()
        };
        store.put_timer(&replacement).await.unwrap();

        let timers = store.list_timers().await.unwrap();
        assert_eq!(timers.len(), 1);
        assert_eq!(timers[0].level, 2);

        store.remove_timer("n-1").await.unwrap();
        // Removing twice is a no-op, not an error.
        store.remove_timer("n-1").await.unwrap();
        assert!(store.list_timers().await.unwrap().is_empty());
    }
}
