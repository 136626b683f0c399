//! Delivery collaborator: hands a broadcast to whatever reaches end-user
//! devices. The engine never blocks materially on delivery confirmation
//! beyond initial dispatch acceptance; delivery failures surface only as log
//! status transitions.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::{LogId, MemberId, NodeId, NotificationId, Priority, TreeId};

pub mod webhook;
pub use webhook::WebhookNotifier;

/// Error type for dispatch attempts.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("dispatch rejected: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("dispatch timed out")]
    Timeout,
}

/// How far a successful dispatch got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// The delivery channel accepted the message; confirmation arrives
    /// later through a delivery callback.
    Accepted,
    /// The channel confirmed delivery synchronously.
    Delivered,
}

/// Everything a delivery channel needs to reach one recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dispatch {
    pub notification_id: NotificationId,
    pub tree_id: TreeId,
    pub log_id: LogId,
    pub node_id: NodeId,
    pub member_id: MemberId,
    pub level: u32,
    pub title: String,
    pub message: String,
    pub priority: Priority,
}

/// Delivery collaborator consumed by the engine.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn dispatch(&self, dispatch: &Dispatch) -> Result<DeliveryStatus, NotifyError>;
}

/// Notifier that only logs. Used by the drill runner to rehearse a tree
/// without reaching real devices.
#[derive(Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn dispatch(&self, dispatch: &Dispatch) -> Result<DeliveryStatus, NotifyError> {
        info!(
            notification_id = %dispatch.notification_id,
            member_id = %dispatch.member_id,
            level = dispatch.level,
            priority = %dispatch.priority,
            "dispatch (drill): {}",
            dispatch.title
        );
        Ok(DeliveryStatus::Delivered)
    }
}

/// Test double recording every dispatch. Members added to the failure set
/// are rejected, so per-recipient failure paths can be exercised.
pub struct RecordingNotifier {
    sent: Mutex<Vec<Dispatch>>,
    failing: Mutex<HashSet<MemberId>>,
    /// Status returned for successful dispatches.
    pub outcome: DeliveryStatus,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            outcome: DeliveryStatus::Delivered,
        }
    }

    /// A notifier whose successful dispatches are only accepted, not
    /// confirmed, leaving logs in Sent until a delivery callback.
    pub fn accepting() -> Self {
        Self {
            outcome: DeliveryStatus::Accepted,
            ..Self::new()
        }
    }

    /// Reject every dispatch for this member.
    pub fn fail_member(&self, member_id: &str) {
        self.failing
            .lock()
            .expect("notifier lock poisoned")
            .insert(member_id.to_string());
    }

    /// Dispatches recorded so far.
    pub fn dispatches(&self) -> Vec<Dispatch> {
        self.sent.lock().expect("notifier lock poisoned").clone()
    }

    /// Members dispatched to at a given level.
    pub fn members_at_level(&self, level: u32) -> Vec<MemberId> {
        self.dispatches()
            .into_iter()
            .filter(|d| d.level == level)
            .map(|d| d.member_id)
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn dispatch(&self, dispatch: &Dispatch) -> Result<DeliveryStatus, NotifyError> {
        self.sent
            .lock()
            .expect("notifier lock poisoned")
            .push(dispatch.clone());
        let failing = self.failing.lock().expect("notifier lock poisoned");
        if failing.contains(&dispatch.member_id) {
            return Err(NotifyError::Rejected(format!(
                "no reachable device for {}",
                dispatch.member_id
            )));
        }
        Ok(self.outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatch_for(member: &str) -> Dispatch {
        Dispatch {
            notification_id: "n-1".to_string(),
            tree_id: "tree-1".to_string(),
            log_id: "log-1".to_string(),
            node_id: "node-1".to_string(),
            member_id: member.to_string(),
            level: 1,
            title: "Drill".to_string(),
            message: "This is a drill".to_string(),
            priority: Priority::High,
        }
    }

    #[tokio::test]
    async fn test_recording_notifier_records_and_fails() {
        let notifier = RecordingNotifier::new();
        notifier.fail_member("bob");

        assert!(notifier.dispatch(&dispatch_for("alice")).await.is_ok());
        assert!(notifier.dispatch(&dispatch_for("bob")).await.is_err());

        let sent = notifier.dispatches();
        assert_eq!(sent.len(), 2);
        assert_eq!(notifier.members_at_level(1).len(), 2);
    }
}
