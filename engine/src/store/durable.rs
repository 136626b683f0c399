//! RocksDB-backed notification store.
//!
//! Provides persistent storage with column families for logical data
//! separation. Values are serialized as JSON for debuggability. Conditional
//! updates take the database write lock so that read-modify-write sections
//! are serialized; racing callers observe exactly one winner.
//!
//! Persisting timer deadlines here is what makes scheduler state
//! reconstructible after a process restart.

use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamilyDescriptor, Options, DB};
use serde::{de::DeserializeOwned, Serialize};

use crate::model::{
    log_transition_allowed, notification_transition_allowed, LogStatus, NodeId, Notification,
    NotificationLog, NotificationStatus,
};

use super::schema::{self, ALL_CFS};
use super::{CasOutcome, NotificationStore, StoreError, StoreResult, TimerRecord};

/// RocksDB-backed persistent notification store.
pub struct DurableStore {
    db: RwLock<DB>,
    path: PathBuf,
}

impl DurableStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&opts, &path, cf_descriptors)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self {
            db: RwLock::new(db),
            path,
        })
    }

    /// Create a shared reference to this store.
    pub fn shared(self) -> std::sync::Arc<Self> {
        std::sync::Arc::new(self)
    }

    /// Get the database path.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    // =========================================================================
    // Generic operations (callers hold the appropriate lock)
    // =========================================================================

    fn put_json<T: Serialize>(db: &DB, cf_name: &str, key: &str, value: &T) -> StoreResult<()> {
        let cf = db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::Backend(format!("missing column family {}", cf_name)))?;
        let bytes =
            serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        db.put_cf(&cf, key.as_bytes(), bytes)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn get_json<T: DeserializeOwned>(db: &DB, cf_name: &str, key: &str) -> StoreResult<Option<T>> {
        let cf = db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::Backend(format!("missing column family {}", cf_name)))?;
        match db
            .get_cf(&cf, key.as_bytes())
            .map_err(|e| StoreError::Backend(e.to_string()))?
        {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Values under a key prefix, in lexicographic key order.
    fn scan_prefix<T: DeserializeOwned>(
        db: &DB,
        cf_name: &str,
        prefix: &str,
    ) -> StoreResult<Vec<T>> {
        let cf = db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::Backend(format!("missing column family {}", cf_name)))?;

        let mut values = Vec::new();
        for result in db.prefix_iterator_cf(&cf, prefix.as_bytes()) {
            let (key, value) = result.map_err(|e| StoreError::Backend(e.to_string()))?;
            let key_str = String::from_utf8_lossy(&key);
            if !key_str.starts_with(prefix) {
                break;
            }
            let parsed = serde_json::from_slice(&value)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            values.push(parsed);
        }
        Ok(values)
    }

    /// Logs referenced by index entries under `prefix`, in index order.
    fn logs_by_index(db: &DB, prefix: &str) -> StoreResult<Vec<NotificationLog>> {
        let log_ids: Vec<String> = Self::scan_prefix(db, schema::CF_LOG_INDEX, prefix)?;
        let mut logs = Vec::with_capacity(log_ids.len());
        for log_id in log_ids {
            if let Some(log) = Self::get_json(db, schema::CF_LOGS, &schema::keys::log(&log_id))? {
                logs.push(log);
            }
        }
        Ok(logs)
    }

    fn next_sequence(db: &DB, notification_id: &str, level: u32) -> StoreResult<u32> {
        let prefix = schema::keys::log_index_level_prefix(notification_id, level);
        let existing: Vec<String> = Self::scan_prefix(db, schema::CF_LOG_INDEX, &prefix)?;
        Ok(existing.len() as u32)
    }
}

#[async_trait]
impl NotificationStore for DurableStore {
    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        Self::put_json(
            &db,
            schema::CF_NOTIFICATIONS,
            &schema::keys::notification(&notification.id),
            notification,
        )
    }

    async fn get_notification(&self, id: &str) -> StoreResult<Option<Notification>> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        Self::get_json(&db, schema::CF_NOTIFICATIONS, &schema::keys::notification(id))
    }

    async fn compare_and_set_notification_status(
        &self,
        id: &str,
        expected: &[NotificationStatus],
        new: NotificationStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<bool> {
        // Write lock: the read-modify-write below must not interleave.
        let db = self.db.write().map_err(|_| StoreError::LockPoisoned)?;
        let key = schema::keys::notification(id);
        let mut notification: Notification =
            Self::get_json(&db, schema::CF_NOTIFICATIONS, &key)?
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
        Self::put_json(&db, schema::CF_NOTIFICATIONS, &key, &notification)?;
        Ok(true)
    }

    async fn insert_logs(&self, logs: &[NotificationLog]) -> StoreResult<()> {
        let db = self.db.write().map_err(|_| StoreError::LockPoisoned)?;
        for log in logs {
            let sequence = Self::next_sequence(&db, &log.notification_id, log.level)?;
            Self::put_json(&db, schema::CF_LOGS, &schema::keys::log(&log.id), log)?;
            Self::put_json(
                &db,
                schema::CF_LOG_INDEX,
                &schema::keys::log_index(&log.notification_id, log.level, sequence),
                &log.id,
            )?;
        }
        Ok(())
    }

    async fn logs_for_notification(&self, id: &str) -> StoreResult<Vec<NotificationLog>> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        Self::logs_by_index(&db, &schema::keys::log_index_prefix(id))
    }

    async fn logs_at_level(&self, id: &str, level: u32) -> StoreResult<Vec<NotificationLog>> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        Self::logs_by_index(&db, &schema::keys::log_index_level_prefix(id, level))
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
        let db = self.db.write().map_err(|_| StoreError::LockPoisoned)?;
        let key = schema::keys::log(log_id);
        let mut log: NotificationLog = Self::get_json(&db, schema::CF_LOGS, &key)?
            .ok_or_else(|| StoreError::NotFound(format!("log {}", log_id)))?;

        if !expected.contains(&log.status) || !log_transition_allowed(log.status, new) {
            return Ok(CasOutcome::Rejected(log));
        }

        log.apply_transition(new, at, response, escalated_to);
        Self::put_json(&db, schema::CF_LOGS, &key, &log)?;
        Ok(CasOutcome::Applied(log))
    }

    async fn put_timer(&self, record: &TimerRecord) -> StoreResult<()> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        Self::put_json(
            &db,
            schema::CF_TIMERS,
            &schema::keys::timer(&record.notification_id),
            record,
        )
    }

    async fn remove_timer(&self, notification_id: &str) -> StoreResult<()> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        let cf = db
            .cf_handle(schema::CF_TIMERS)
            .ok_or_else(|| StoreError::Backend("missing column family timers".to_string()))?;
        db.delete_cf(&cf, schema::keys::timer(notification_id).as_bytes())
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn list_timers(&self) -> StoreResult<Vec<TimerRecord>> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        Self::scan_prefix(&db, schema::CF_TIMERS, "tmr:")
    }
}
