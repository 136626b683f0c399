//! Timeout scheduler: one pending escalation trigger per in-flight
//! notification.
//!
//! Each armed timer is a deferred tokio task keyed by a monotonic epoch.
//! A fired task must find its own epoch still registered before it may act,
//! so a timer that was cancelled or replaced while sleeping detects it and
//! exits silently; no locking is needed on the hot acknowledgment path.
//! Deadlines are persisted through the store, making the in-memory registry
//! a reconstructible cache rather than the system of record.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::model::NotificationId;
use crate::store::{NotificationStore, StoreError, StoreResult, TimerRecord};

/// Receiver of timer expirations. The escalation engine implements this;
/// its stale-level guard absorbs any fire that lost a race.
#[async_trait]
pub trait EscalationHook: Send + Sync {
    async fn level_timed_out(self: Arc<Self>, notification_id: NotificationId, level: u32);
}

struct TimerEntry {
    level: u32,
    epoch: u64,
    handle: JoinHandle<()>,
}

/// Shared reference to TimeoutScheduler
pub type SharedScheduler = Arc<TimeoutScheduler>;

/// Per-notification escalation timers.
pub struct TimeoutScheduler {
    store: Arc<dyn NotificationStore>,
    entries: Arc<Mutex<HashMap<NotificationId, TimerEntry>>>,
    epoch: AtomicU64,
}

impl TimeoutScheduler {
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self {
            store,
            entries: Arc::new(Mutex::new(HashMap::new())),
            epoch: AtomicU64::new(0),
        }
    }

    /// Create a shared reference to this scheduler.
    pub fn shared(self) -> SharedScheduler {
        Arc::new(self)
    }

    /// Arm (or replace) the timer for a notification. After `window`
    /// elapses, `hook.level_timed_out(notification_id, level)` runs unless
    /// the timer was cancelled or replaced first. Arming while an older
    /// timer is live is always safe; the superseded task detects its stale
    /// epoch and does nothing.
    pub async fn arm(
        &self,
        hook: Arc<dyn EscalationHook>,
        notification_id: &str,
        level: u32,
        window: Duration,
    ) -> StoreResult<()> {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let deadline = Utc::now()
            + chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero());

        self.store
            .put_timer(&TimerRecord {
                notification_id: notification_id.to_string(),
                level,
                epoch,
                deadline,
            })
            .await?;

        let entries = Arc::clone(&self.entries);
        let store = Arc::clone(&self.store);
        let id = notification_id.to_string();

        // The registry lock is held across the spawn so a zero-length timer
        // cannot wake before its entry exists.
        let mut map = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;

            let live = match entries.lock() {
                Ok(mut map) => match map.get(&id) {
                    Some(entry) if entry.epoch == epoch => {
                        map.remove(&id);
                        true
                    }
                    _ => false,
                },
                Err(_) => false,
            };
            if !live {
                debug!(notification_id = %id, level, "timer superseded; ignoring");
                return;
            }

            if let Err(err) = store.remove_timer(&id).await {
                warn!(%err, notification_id = %id, "failed to clear fired timer record");
            }
            debug!(notification_id = %id, level, "response window expired");
            hook.level_timed_out(id, level).await;
        });

        if let Some(previous) = map.insert(
            notification_id.to_string(),
            TimerEntry {
                level,
                epoch,
                handle,
            },
        ) {
            previous.handle.abort();
        }
        Ok(())
    }

    /// Cancel the pending timer for a notification. A no-op when none
    /// exists or it already fired; a timer that fires concurrently with
    /// cancellation is absorbed by the hook's stale-level guard.
    pub async fn cancel(&self, notification_id: &str) -> StoreResult<()> {
        let removed = {
            let mut map = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
            map.remove(notification_id)
        };
        if let Some(entry) = removed {
            entry.handle.abort();
            debug!(notification_id, level = entry.level, "timer cancelled");
        }
        self.store.remove_timer(notification_id).await
    }

    /// Level the live timer for a notification is armed for, if any.
    pub fn pending_level(&self, notification_id: &str) -> Option<u32> {
        self.entries
            .lock()
            .ok()
            .and_then(|map| map.get(notification_id).map(|e| e.level))
    }

    /// Re-arm timers from the store's persisted deadlines, for use after a
    /// restart. Past-due deadlines fire immediately.
    pub async fn restore(&self, hook: Arc<dyn EscalationHook>) -> StoreResult<usize> {
        let records = self.store.list_timers().await?;
        let count = records.len();
        for record in records {
            let remaining = record
                .deadline
                .signed_duration_since(Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO);
            self.arm(
                Arc::clone(&hook),
                &record.notification_id,
                record.level,
                remaining,
            )
            .await?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[derive(Default)]
    struct RecordingHook {
        fired: Mutex<Vec<(NotificationId, u32)>>,
    }

    impl RecordingHook {
        fn fired(&self) -> Vec<(NotificationId, u32)> {
            self.fired.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EscalationHook for RecordingHook {
        async fn level_timed_out(self: Arc<Self>, notification_id: NotificationId, level: u32) {
            self.fired.lock().unwrap().push((notification_id, level));
        }
    }

    fn setup() -> (TimeoutScheduler, Arc<RecordingHook>) {
        let store: Arc<dyn NotificationStore> = InMemoryStore::new().shared();
        (TimeoutScheduler::new(store), Arc::new(RecordingHook::default()))
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_window() {
        let (scheduler, hook) = setup();

        scheduler
            .arm(hook.clone(), "n-1", 1, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(scheduler.pending_level("n-1"), Some(1));

        tokio::time::sleep(Duration::from_secs(61)).await;
        settle().await;

        assert_eq!(hook.fired(), vec![("n-1".to_string(), 1)]);
        assert_eq!(scheduler.pending_level("n-1"), None);
        // Fired timer clears its persisted record.
        assert!(scheduler.store.list_timers().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_fire() {
        let (scheduler, hook) = setup();

        scheduler
            .arm(hook.clone(), "n-1", 1, Duration::from_secs(60))
            .await
            .unwrap();
        scheduler.cancel("n-1").await.unwrap();

        tokio::time::sleep(Duration::from_secs(120)).await;
        settle().await;

        assert!(hook.fired().is_empty());
        assert!(scheduler.store.list_timers().await.unwrap().is_empty());
        // Cancelling again is a no-op.
        scheduler.cancel("n-1").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_older_timer() {
        let (scheduler, hook) = setup();

        scheduler
            .arm(hook.clone(), "n-1", 1, Duration::from_secs(600))
            .await
            .unwrap();
        scheduler
            .arm(hook.clone(), "n-1", 2, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(scheduler.pending_level("n-1"), Some(2));

        tokio::time::sleep(Duration::from_secs(700)).await;
        settle().await;

        // Only the replacement fired; the superseded level-1 timer stayed
        // silent.
        assert_eq!(hook.fired(), vec![("n-1".to_string(), 2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_notifications() {
        let (scheduler, hook) = setup();

        scheduler
            .arm(hook.clone(), "n-1", 1, Duration::from_secs(30))
            .await
            .unwrap();
        scheduler
            .arm(hook.clone(), "n-2", 1, Duration::from_secs(90))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(31)).await;
        settle().await;
        assert_eq!(hook.fired(), vec![("n-1".to_string(), 1)]);
        assert_eq!(scheduler.pending_level("n-2"), Some(1));

        tokio::time::sleep(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(hook.fired().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_rearms_past_due_deadlines() {
        let store: Arc<dyn NotificationStore> = InMemoryStore::new().shared();
        store
            .put_timer(&TimerRecord {
                notification_id: "n-1".to_string(),
                level: 2,
                epoch: 1,
                deadline: Utc::now() - chrono::Duration::seconds(30),
            })
            .await
            .unwrap();

        let scheduler = TimeoutScheduler::new(store);
        let hook = Arc::new(RecordingHook::default());
        let restored = scheduler.restore(hook.clone()).await.unwrap();
        assert_eq!(restored, 1);

        tokio::time::sleep(Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(hook.fired(), vec![("n-1".to_string(), 2)]);
    }
}
