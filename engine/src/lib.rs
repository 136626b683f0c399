//! Escalation engine for emergency calling trees.
//!
//! Drives a notification through an ordered hierarchy of recipients:
//! dispatches a level, enforces its response window, tracks per-recipient
//! acknowledgment, and escalates to the next level when a level fails to
//! produce a timely response.
//!
//! The crate is organized around three collaborators the engine consumes
//! behind traits:
//! - [`tree::TreeDirectory`]: read-only calling-tree membership
//! - [`store::NotificationStore`]: durable notification/log state with
//!   atomic conditional updates (the single source of truth)
//! - [`notifier::Notifier`]: the delivery channel reaching end-user devices
//!
//! and two pieces the engine owns:
//! - [`scheduler::TimeoutScheduler`]: one cancellable, epoch-guarded
//!   escalation timer per in-flight notification
//! - [`events::EventBus`]: pub/sub lifecycle events for realtime consumers

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod model;
pub mod notifier;
pub mod scheduler;
pub mod status;
pub mod store;
pub mod tree;

// Re-export the engine surface
pub use engine::{EscalationEngine, SharedEngine, TriggerRequest};

// Re-export key entity and status types
pub use model::{
    derive_current_level, EscalationCause, LogStatus, Notification, NotificationLog,
    NotificationStatus, NotificationWithLogs, Priority,
};

// Re-export collaborator seams
pub use notifier::{DeliveryStatus, Dispatch, Notifier, NotifyError, RecordingNotifier, TracingNotifier, WebhookNotifier};
pub use store::{CasOutcome, InMemoryStore, NotificationStore, StoreError, TimerRecord};
pub use tree::{InMemoryTreeDirectory, TreeDirectory, TreeNode, TreeSnapshot, TreeStatus};

#[cfg(feature = "durable-state")]
pub use store::DurableStore;

// Re-export supporting types
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use events::{EventBus, NotificationEvent, SharedEventBus};
pub use scheduler::{EscalationHook, TimeoutScheduler};
pub use status::{project, StatusSummary};
