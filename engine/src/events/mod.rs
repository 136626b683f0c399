//! Pub/sub surface for realtime consumers of notification progress.

mod bus;
mod types;

pub use bus::{EventBus, NotificationReceiver, SharedEventBus};
pub use types::NotificationEvent;
