//! Column family definitions for the durable notification store.
//!
//! Each column family provides logical separation of data types while
//! sharing the same RocksDB instance.

/// Column family for notification rows
pub const CF_NOTIFICATIONS: &str = "notifications";

/// Column family for per-recipient log rows, keyed by log id
pub const CF_LOGS: &str = "logs";

/// Column family mapping (notification, level, sequence) to log ids, so a
/// notification's logs can be prefix-scanned in dispatch order
pub const CF_LOG_INDEX: &str = "log_index";

/// Column family for armed timer deadlines
pub const CF_TIMERS: &str = "timers";

/// All column family names
pub const ALL_CFS: &[&str] = &[CF_NOTIFICATIONS, CF_LOGS, CF_LOG_INDEX, CF_TIMERS];

/// Key prefixes for compound keys
pub mod keys {
    /// Create a notification key
    pub fn notification(id: &str) -> String {
        format!("ntf:{}", id)
    }

    /// Create a log key
    pub fn log(log_id: &str) -> String {
        format!("log:{}", log_id)
    }

    /// Prefix matching every index entry of a notification
    pub fn log_index_prefix(notification_id: &str) -> String {
        format!("idx:{}:", notification_id)
    }

    /// Prefix matching the index entries of one level
    pub fn log_index_level_prefix(notification_id: &str, level: u32) -> String {
        format!("idx:{}:{:05}:", notification_id, level)
    }

    /// Create a log index key. Zero-padding keeps lexicographic order equal
    /// to (level, dispatch sequence) order.
    pub fn log_index(notification_id: &str, level: u32, sequence: u32) -> String {
        format!("idx:{}:{:05}:{:05}", notification_id, level, sequence)
    }

    /// Create a timer key
    pub fn timer(notification_id: &str) -> String {
        format!("tmr:{}", notification_id)
    }
}
