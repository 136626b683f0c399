//! Escalation engine: drives a notification from trigger to terminal state.
//!
//! The engine owns no authoritative in-memory state. Every cross-cutting
//! mutation (log transition, level-completion check, notification status
//! change, timer re-arm) happens under a per-notification serialization
//! guard on top of the store's conditional updates, because an
//! acknowledgment completing a level and the level's timer can race within
//! microseconds. The race is resolved by the stale-level check in
//! [`EscalationEngine::escalate`], not by locking the timer out: both sides
//! may fire, at most one produces an effect.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::events::{EventBus, NotificationEvent, SharedEventBus};
use crate::model::{
    derive_current_level, new_id, EscalationCause, LogStatus, MemberId, Notification,
    NotificationId, NotificationLog, NotificationStatus, NotificationWithLogs, Priority, TreeId,
};
use crate::notifier::{DeliveryStatus, Dispatch, Notifier};
use crate::scheduler::{EscalationHook, SharedScheduler, TimeoutScheduler};
use crate::status::{project, StatusSummary};
use crate::store::{NotificationStore, StoreError, StoreResult};
use crate::tree::{TreeDirectory, TreeSnapshot, TreeStatus};

/// Everything needed to initiate a broadcast.
#[derive(Debug, Clone)]
pub struct TriggerRequest {
    pub tree_id: TreeId,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub initiated_by: Option<MemberId>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl TriggerRequest {
    pub fn new(tree_id: &str, title: &str, message: &str) -> Self {
        Self {
            tree_id: tree_id.to_string(),
            title: title.to_string(),
            message: message.to_string(),
            priority: Priority::default(),
            initiated_by: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_initiator(mut self, member_id: &str) -> Self {
        self.initiated_by = Some(member_id.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// Bounds for one recipient's fire-and-forget dispatch.
#[derive(Clone, Copy)]
struct DispatchPolicy {
    timeout: Duration,
    retries: u32,
    backoff: Duration,
}

/// Shared reference to EscalationEngine
pub type SharedEngine = Arc<EscalationEngine>;

/// The state machine driving notifications through their calling trees.
pub struct EscalationEngine {
    trees: Arc<dyn TreeDirectory>,
    store: Arc<dyn NotificationStore>,
    notifier: Arc<dyn Notifier>,
    scheduler: SharedScheduler,
    events: SharedEventBus,
    config: EngineConfig,
    /// Per-notification serialization guards; an entry lives for the
    /// duration of the notification and is dropped at its terminal
    /// transition.
    guards: Mutex<HashMap<NotificationId, Arc<tokio::sync::Mutex<()>>>>,
    /// Handle to ourselves for arming timer callbacks.
    self_ref: Weak<EscalationEngine>,
}

impl EscalationEngine {
    pub fn new(
        trees: Arc<dyn TreeDirectory>,
        store: Arc<dyn NotificationStore>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> SharedEngine {
        let scheduler = TimeoutScheduler::new(Arc::clone(&store)).shared();
        Arc::new_cyclic(|me| Self {
            trees,
            store,
            notifier,
            scheduler,
            events: EventBus::new().shared(),
            config,
            guards: Mutex::new(HashMap::new()),
            self_ref: me.clone(),
        })
    }

    /// Event bus carrying this engine's lifecycle events.
    pub fn events(&self) -> &SharedEventBus {
        &self.events
    }

    /// Timer registry, exposed for introspection.
    pub fn scheduler(&self) -> &TimeoutScheduler {
        &self.scheduler
    }

    // =========================================================================
    // Public contract
    // =========================================================================

    /// Initiate a broadcast over a calling tree. Snapshots the first
    /// populated level, creates its logs in Sent, hands each recipient to
    /// the notifier without waiting for delivery, arms the response-window
    /// timer, and returns the new notification id.
    pub async fn trigger(&self, request: TriggerRequest) -> EngineResult<NotificationId> {
        let tree = self
            .trees
            .get_levels(&request.tree_id)
            .await?
            .ok_or_else(|| EngineError::TreeNotFound(request.tree_id.clone()))?;

        if tree.status != TreeStatus::Active {
            return Err(EngineError::TreeNotActive(request.tree_id.clone()));
        }

        // A tree whose levels are all empty has nobody to call: same as
        // having no levels.
        let first_level = tree
            .first_populated_level()
            .ok_or_else(|| EngineError::TreeNotFound(request.tree_id.clone()))?;

        let now = Utc::now();
        let notification = Notification {
            id: new_id(),
            tree_id: request.tree_id.clone(),
            title: request.title,
            message: request.message,
            priority: request.priority,
            status: NotificationStatus::InProgress,
            initiated_by: request.initiated_by,
            initiated_at: now,
            completed_at: None,
            total_levels: tree.total_levels(),
            metadata: request.metadata,
        };
        let notification_id = notification.id.clone();

        self.with_persist_retry("insert_notification", || {
            self.store.insert_notification(&notification)
        })
        .await?;

        let guard = self.guard_for(&notification_id)?;
        let _serialized = guard.lock().await;

        info!(
            notification_id = %notification_id,
            tree_id = %tree.id,
            priority = %notification.priority,
            level = first_level,
            "notification triggered"
        );
        self.events.publish(NotificationEvent::Triggered {
            notification_id: notification_id.clone(),
            tree_id: tree.id.clone(),
            timestamp: now,
        });

        self.dispatch_level(&notification, &tree, first_level).await?;
        Ok(notification_id)
    }

    /// Record a recipient's response. Conditionally moves their log at the
    /// current level from Sent/Delivered to Acknowledged; a duplicate
    /// acknowledgment is a benign no-op. Returns whether the acknowledgment
    /// was newly applied. When the current level is now fully acknowledged,
    /// cancels the timer and completes the notification; later levels are
    /// never dispatched.
    pub async fn acknowledge(
        &self,
        notification_id: &str,
        member_id: &str,
        response: Option<String>,
    ) -> EngineResult<bool> {
        let guard = self.guard_for(notification_id)?;
        let _serialized = guard.lock().await;

        let notification = self
            .store
            .get_notification(notification_id)
            .await?
            .ok_or_else(|| EngineError::NotificationNotFound(notification_id.to_string()))?;
        let logs = self.store.logs_for_notification(notification_id).await?;

        if notification.is_terminal() {
            // A duplicate of the acknowledgment that finished the broadcast
            // is still idempotent, anything else is misuse of a finished
            // notification.
            if logs
                .iter()
                .any(|l| l.member_id == member_id && l.status == LogStatus::Acknowledged)
            {
                return Ok(false);
            }
            return Err(EngineError::NotificationTerminal(
                notification_id.to_string(),
            ));
        }

        let current = derive_current_level(&logs).ok_or_else(|| {
            EngineError::NotFoundAtCurrentLevel {
                member: member_id.to_string(),
                level: 0,
            }
        })?;

        let log = logs
            .iter()
            .find(|l| l.level == current && l.member_id == member_id)
            .ok_or_else(|| EngineError::NotFoundAtCurrentLevel {
                member: member_id.to_string(),
                level: current,
            })?;

        let newly_applied = match log.status {
            LogStatus::Acknowledged => {
                debug!(notification_id, member_id, "duplicate acknowledgment ignored");
                false
            }
            LogStatus::Sent | LogStatus::Delivered => {
                let outcome = self
                    .store
                    .compare_and_set_log_status(
                        &log.id,
                        &[LogStatus::Sent, LogStatus::Delivered],
                        LogStatus::Acknowledged,
                        Utc::now(),
                        response,
                        None,
                    )
                    .await?;
                if outcome.applied() {
                    info!(notification_id, member_id, level = current, "acknowledged");
                    self.events.publish(NotificationEvent::Acknowledged {
                        notification_id: notification_id.to_string(),
                        member_id: member_id.to_string(),
                        level: current,
                        timestamp: Utc::now(),
                    });
                }
                outcome.applied()
            }
            _ => {
                return Err(EngineError::NotFoundAtCurrentLevel {
                    member: member_id.to_string(),
                    level: current,
                })
            }
        };

        let level_logs = self.store.logs_at_level(notification_id, current).await?;
        let level_complete = !level_logs.is_empty()
            && level_logs
                .iter()
                .all(|l| l.status == LogStatus::Acknowledged);
        if level_complete {
            self.scheduler.cancel(notification_id).await?;
            let completed = self
                .store
                .compare_and_set_notification_status(
                    notification_id,
                    &[NotificationStatus::InProgress],
                    NotificationStatus::Completed,
                    Some(Utc::now()),
                )
                .await?;
            if completed {
                info!(
                    notification_id,
                    level = current,
                    "level fully acknowledged; notification completed"
                );
                self.events.publish(NotificationEvent::Completed {
                    notification_id: notification_id.to_string(),
                    timestamp: Utc::now(),
                });
                self.release_guard(notification_id);
            }
        }

        Ok(newly_applied)
    }

    /// Move past a level, either because its response window expired or by
    /// authorized manual override. A `from_level` that no longer matches
    /// the current level is a silent no-op returning false: the benign
    /// outcome of a timer racing a just-completed level. Marks the level's
    /// open logs TimedOut (timer) or Escalated (manual), then dispatches
    /// the next populated level, or fails the notification when none
    /// remains.
    pub async fn escalate(
        &self,
        notification_id: &str,
        from_level: u32,
        cause: EscalationCause,
    ) -> EngineResult<bool> {
        let guard = self.guard_for(notification_id)?;
        let _serialized = guard.lock().await;

        let notification = self
            .store
            .get_notification(notification_id)
            .await?
            .ok_or_else(|| EngineError::NotificationNotFound(notification_id.to_string()))?;

        if notification.is_terminal() {
            return match cause {
                // A timer that lost the cancellation race.
                EscalationCause::Timeout => {
                    debug!(notification_id, from_level, "timer fired on terminal notification");
                    Ok(false)
                }
                EscalationCause::Manual => Err(EngineError::NotificationTerminal(
                    notification_id.to_string(),
                )),
            };
        }

        let logs = self.store.logs_for_notification(notification_id).await?;
        if derive_current_level(&logs) != Some(from_level) {
            debug!(notification_id, from_level, "stale escalation request ignored");
            return Ok(false);
        }

        let tree = self
            .trees
            .get_levels(&notification.tree_id)
            .await?
            .ok_or_else(|| EngineError::TreeNotFound(notification.tree_id.clone()))?;

        let next_level = tree.next_populated_level(from_level);
        let to_status = match cause {
            EscalationCause::Timeout => LogStatus::TimedOut,
            EscalationCause::Manual => LogStatus::Escalated,
        };
        let now = Utc::now();

        let level_logs = self.store.logs_at_level(notification_id, from_level).await?;
        for (index, log) in level_logs.iter().enumerate() {
            if log.status.is_terminal() {
                continue;
            }
            let escalated_to = next_level
                .and_then(|level| tree.covering_node(level, index))
                .map(|node| node.id.clone());
            let outcome = self
                .store
                .compare_and_set_log_status(
                    &log.id,
                    &[LogStatus::Pending, LogStatus::Sent, LogStatus::Delivered],
                    to_status,
                    now,
                    None,
                    escalated_to,
                )
                .await?;
            if outcome.applied() {
                self.events.publish(NotificationEvent::LogStatusChanged {
                    notification_id: notification_id.to_string(),
                    member_id: log.member_id.clone(),
                    level: from_level,
                    status: to_status,
                    timestamp: now,
                });
            }
        }

        self.events.publish(NotificationEvent::LevelEscalated {
            notification_id: notification_id.to_string(),
            from_level,
            to_level: next_level,
            cause,
            timestamp: now,
        });

        match next_level {
            Some(level) => {
                info!(
                    notification_id,
                    from_level,
                    level,
                    cause = %cause,
                    "escalating to next level"
                );
                self.dispatch_level(&notification, &tree, level).await?;
                Ok(true)
            }
            None => {
                self.scheduler.cancel(notification_id).await?;
                let failed = self
                    .store
                    .compare_and_set_notification_status(
                        notification_id,
                        &[NotificationStatus::InProgress],
                        NotificationStatus::Failed,
                        Some(now),
                    )
                    .await?;
                if failed {
                    warn!(
                        notification_id,
                        from_level, "all levels exhausted without acknowledgment; notification failed"
                    );
                    self.events.publish(NotificationEvent::Failed {
                        notification_id: notification_id.to_string(),
                        timestamp: now,
                    });
                    self.release_guard(notification_id);
                }
                Ok(true)
            }
        }
    }

    /// Delivery-callback path: the delivery channel confirmed a recipient's
    /// device received the message. Benign no-op when the log has already
    /// moved on.
    pub async fn mark_delivered(
        &self,
        notification_id: &str,
        member_id: &str,
    ) -> EngineResult<bool> {
        let notification = self
            .store
            .get_notification(notification_id)
            .await?
            .ok_or_else(|| EngineError::NotificationNotFound(notification_id.to_string()))?;
        if notification.is_terminal() {
            return Ok(false);
        }

        let logs = self.store.logs_for_notification(notification_id).await?;
        let log = logs
            .iter()
            .rev()
            .find(|l| l.member_id == member_id && l.status == LogStatus::Sent);
        let Some(log) = log else {
            return Ok(false);
        };

        // Single-row conditional update; level completion never depends on
        // Delivered, so the serialization guard is not needed here.
        let outcome = self
            .store
            .compare_and_set_log_status(
                &log.id,
                &[LogStatus::Sent],
                LogStatus::Delivered,
                Utc::now(),
                None,
                None,
            )
            .await?;
        if outcome.applied() {
            self.events.publish(NotificationEvent::LogStatusChanged {
                notification_id: notification_id.to_string(),
                member_id: member_id.to_string(),
                level: log.level,
                status: LogStatus::Delivered,
                timestamp: Utc::now(),
            });
        }
        Ok(outcome.applied())
    }

    /// Pure read: true iff every log at the level is Acknowledged. A level
    /// with no logs is vacuously complete.
    pub async fn check_level_complete(
        &self,
        notification_id: &str,
        level: u32,
    ) -> EngineResult<bool> {
        self.store
            .get_notification(notification_id)
            .await?
            .ok_or_else(|| EngineError::NotificationNotFound(notification_id.to_string()))?;
        let logs = self.store.logs_at_level(notification_id, level).await?;
        Ok(logs.iter().all(|l| l.status == LogStatus::Acknowledged))
    }

    /// Aggregate progress for read consumers.
    pub async fn status(&self, notification_id: &str) -> EngineResult<StatusSummary> {
        let notification = self
            .store
            .get_notification(notification_id)
            .await?
            .ok_or_else(|| EngineError::NotificationNotFound(notification_id.to_string()))?;
        let logs = self.store.logs_for_notification(notification_id).await?;
        Ok(project(&notification, &logs))
    }

    /// The notification plus its ordered log history, for timeline
    /// rendering.
    pub async fn notification_with_logs(
        &self,
        notification_id: &str,
    ) -> EngineResult<NotificationWithLogs> {
        let notification = self
            .store
            .get_notification(notification_id)
            .await?
            .ok_or_else(|| EngineError::NotificationNotFound(notification_id.to_string()))?;
        let logs = self.store.logs_for_notification(notification_id).await?;
        Ok(NotificationWithLogs { notification, logs })
    }

    /// Re-arm escalation timers from the store's persisted deadlines after
    /// a restart. Returns how many were restored.
    pub async fn resume_timers(&self) -> EngineResult<usize> {
        let Some(hook) = self.self_ref.upgrade() else {
            return Ok(0);
        };
        let hook: Arc<dyn EscalationHook> = hook;
        Ok(self.scheduler.restore(hook).await?)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Snapshot a level's membership into Sent logs, hand each recipient to
    /// the notifier without waiting, and arm the response-window timer.
    async fn dispatch_level(
        &self,
        notification: &Notification,
        tree: &TreeSnapshot,
        level: u32,
    ) -> EngineResult<()> {
        let nodes = tree.level_nodes(level);
        let now = Utc::now();
        let logs: Vec<NotificationLog> = nodes
            .iter()
            .map(|node| {
                NotificationLog::sent(&notification.id, &node.id, &node.member_id, level, now)
            })
            .collect();

        self.with_persist_retry("insert_logs", || self.store.insert_logs(&logs))
            .await?;

        let policy = DispatchPolicy {
            timeout: self.config.dispatch_timeout,
            retries: self.config.dispatch_retries,
            backoff: self.config.dispatch_backoff,
        };
        for log in &logs {
            let dispatch = Dispatch {
                notification_id: notification.id.clone(),
                tree_id: notification.tree_id.clone(),
                log_id: log.id.clone(),
                node_id: log.node_id.clone(),
                member_id: log.member_id.clone(),
                level,
                title: notification.title.clone(),
                message: notification.message.clone(),
                priority: notification.priority,
            };
            tokio::spawn(deliver(
                Arc::clone(&self.notifier),
                Arc::clone(&self.store),
                Arc::clone(&self.events),
                dispatch,
                policy,
            ));
        }

        let window = tree
            .response_window
            .unwrap_or(self.config.default_response_window);
        self.arm_timer(&notification.id, level, window).await?;

        debug!(
            notification_id = %notification.id,
            level,
            recipients = logs.len(),
            window_secs = window.as_secs(),
            "level dispatched"
        );
        self.events.publish(NotificationEvent::LevelDispatched {
            notification_id: notification.id.clone(),
            level,
            recipients: logs.len() as u32,
            timestamp: now,
        });
        Ok(())
    }

    async fn arm_timer(
        &self,
        notification_id: &str,
        level: u32,
        window: Duration,
    ) -> EngineResult<()> {
        // The engine is being dropped; nothing left to time out.
        let Some(hook) = self.self_ref.upgrade() else {
            return Ok(());
        };
        let hook: Arc<dyn EscalationHook> = hook;
        self.scheduler
            .arm(hook, notification_id, level, window)
            .await?;
        Ok(())
    }

    fn guard_for(&self, notification_id: &str) -> EngineResult<Arc<tokio::sync::Mutex<()>>> {
        let mut guards = self
            .guards
            .lock()
            .map_err(|_| EngineError::Store(StoreError::LockPoisoned))?;
        Ok(guards
            .entry(notification_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone())
    }

    fn release_guard(&self, notification_id: &str) {
        if let Ok(mut guards) = self.guards.lock() {
            guards.remove(notification_id);
        }
    }

    /// Bounded retry for store operations on the write path; exhausting the
    /// retries fails the triggering operation loudly.
    async fn with_persist_retry<T, F, Fut>(&self, what: &'static str, mut op: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.config.persist_retries => {
                    attempt += 1;
                    warn!(%err, what, attempt, "store operation failed; retrying");
                    tokio::time::sleep(self.config.persist_backoff).await;
                }
                Err(err) => {
                    error!(%err, what, "store operation failed; giving up");
                    return Err(err);
                }
            }
        }
    }
}

#[async_trait]
impl EscalationHook for EscalationEngine {
    async fn level_timed_out(self: Arc<Self>, notification_id: NotificationId, level: u32) {
        match self
            .escalate(&notification_id, level, EscalationCause::Timeout)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!(notification_id = %notification_id, level, "expired timer absorbed as no-op")
            }
            Err(err) => {
                error!(%err, notification_id = %notification_id, level, "timeout escalation failed")
            }
        }
    }
}

/// One recipient's fire-and-forget dispatch: bounded attempts against the
/// notifier, then a conditional log update reflecting the outcome. A
/// failure here never aborts the level or the notification.
async fn deliver(
    notifier: Arc<dyn Notifier>,
    store: Arc<dyn NotificationStore>,
    events: SharedEventBus,
    dispatch: Dispatch,
    policy: DispatchPolicy,
) {
    let mut attempt = 0u32;
    let outcome = loop {
        match tokio::time::timeout(policy.timeout, notifier.dispatch(&dispatch)).await {
            Ok(Ok(status)) => break Ok(status),
            Ok(Err(err)) if attempt < policy.retries => {
                attempt += 1;
                warn!(
                    %err,
                    member_id = %dispatch.member_id,
                    attempt,
                    "dispatch failed; retrying"
                );
                tokio::time::sleep(policy.backoff).await;
            }
            Ok(Err(err)) => break Err(err.to_string()),
            Err(_) if attempt < policy.retries => {
                attempt += 1;
                warn!(
                    member_id = %dispatch.member_id,
                    attempt,
                    "dispatch attempt timed out; retrying"
                );
                tokio::time::sleep(policy.backoff).await;
            }
            Err(_) => break Err("dispatch timed out".to_string()),
        }
    };

    match outcome {
        Ok(DeliveryStatus::Delivered) => {
            let result = store
                .compare_and_set_log_status(
                    &dispatch.log_id,
                    &[LogStatus::Sent],
                    LogStatus::Delivered,
                    Utc::now(),
                    None,
                    None,
                )
                .await;
            match result {
                Ok(outcome) if outcome.applied() => {
                    events.publish(NotificationEvent::LogStatusChanged {
                        notification_id: dispatch.notification_id.clone(),
                        member_id: dispatch.member_id.clone(),
                        level: dispatch.level,
                        status: LogStatus::Delivered,
                        timestamp: Utc::now(),
                    });
                }
                Ok(_) => {}
                Err(err) => warn!(%err, log_id = %dispatch.log_id, "failed to record delivery"),
            }
        }
        Ok(DeliveryStatus::Accepted) => {
            debug!(
                member_id = %dispatch.member_id,
                "dispatch accepted; awaiting delivery callback"
            );
        }
        Err(reason) => {
            warn!(
                member_id = %dispatch.member_id,
                notification_id = %dispatch.notification_id,
                reason = %reason,
                "dispatch exhausted; marking log failed"
            );
            let result = store
                .compare_and_set_log_status(
                    &dispatch.log_id,
                    &[LogStatus::Pending, LogStatus::Sent],
                    LogStatus::Failed,
                    Utc::now(),
                    None,
                    None,
                )
                .await;
            match result {
                Ok(outcome) if outcome.applied() => {
                    events.publish(NotificationEvent::LogStatusChanged {
                        notification_id: dispatch.notification_id.clone(),
                        member_id: dispatch.member_id.clone(),
                        level: dispatch.level,
                        status: LogStatus::Failed,
                        timestamp: Utc::now(),
                    });
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(%err, log_id = %dispatch.log_id, "failed to record dispatch failure")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::RecordingNotifier;
    use crate::store::InMemoryStore;
    use crate::tree::InMemoryTreeDirectory;

    fn engine_with_tree(tree: TreeSnapshot) -> (SharedEngine, TreeId) {
        let directory = InMemoryTreeDirectory::new();
        let tree_id = directory.insert(tree);
        let engine = EscalationEngine::new(
            Arc::new(directory),
            InMemoryStore::new().shared(),
            Arc::new(RecordingNotifier::new()),
            EngineConfig::default(),
        );
        (engine, tree_id)
    }

    #[tokio::test]
    async fn test_trigger_unknown_tree() {
        let (engine, _) = engine_with_tree(TreeSnapshot::new("ops", TreeStatus::Active, None));
        let err = engine
            .trigger(TriggerRequest::new("no-such-tree", "Drill", "msg"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::TreeNotFound(_)));
    }

    #[tokio::test]
    async fn test_trigger_inactive_tree() {
        let mut tree = TreeSnapshot::new("ops", TreeStatus::Draft, None);
        tree.push_level(&["alice"]);
        let (engine, tree_id) = engine_with_tree(tree);

        let err = engine
            .trigger(TriggerRequest::new(&tree_id, "Drill", "msg"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::TreeNotActive(_)));
    }

    #[tokio::test]
    async fn test_trigger_tree_without_members() {
        let mut tree = TreeSnapshot::new("hollow", TreeStatus::Active, None);
        tree.push_level(&[]);
        let (engine, tree_id) = engine_with_tree(tree);

        let err = engine
            .trigger(TriggerRequest::new(&tree_id, "Drill", "msg"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::TreeNotFound(_)));
    }

    #[tokio::test]
    async fn test_acknowledge_unknown_notification() {
        let (engine, _) = engine_with_tree(TreeSnapshot::new("ops", TreeStatus::Active, None));
        let err = engine
            .acknowledge("no-such-notification", "alice", None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotificationNotFound(_)));
    }

    #[tokio::test]
    async fn test_trigger_request_builder() {
        let request = TriggerRequest::new("tree-1", "Drill", "msg")
            .with_priority(Priority::Critical)
            .with_initiator("ops")
            .with_metadata("site", serde_json::json!("plant-b"));
        assert_eq!(request.priority, Priority::Critical);
        assert_eq!(request.initiated_by.as_deref(), Some("ops"));
        assert_eq!(request.metadata["site"], "plant-b");
    }
}
