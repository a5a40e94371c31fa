/*!
# Window State Store

One persisted row per stream-source UID in the shared `window_state` table,
schema `{uid TEXT PRIMARY KEY, timed BIGINT}`. The `timed` column is the
last-trigger instant in epoch milliseconds, `-1` meaning "never triggered".
Only the ingest trigger advances it; anyone may read it, including directly
with `SELECT timed FROM window_state WHERE uid = '<uid>'` for diagnostics.
*/

use crate::sluice::storage::{StorageBackend, StorageError, StorageHandle};
use crate::sluice::stream::element::{DataField, FieldType};
use log::debug;

/// Name of the shared per-source trigger-state table.
pub const WINDOW_STATE_TABLE: &str = "window_state";

/// Sentinel for a source that has never triggered.
pub const NEVER_TRIGGERED: i64 = -1;

/// Handle over the shared window-state table.
#[derive(Clone)]
pub struct WindowStateStore {
    storage: StorageHandle,
}

impl WindowStateStore {
    pub fn new(storage: StorageHandle) -> Self {
        WindowStateStore { storage }
    }

    /// Create the state table if it does not exist yet.
    pub fn ensure_table(&self) -> Result<(), StorageError> {
        if !self.storage.table_exists(WINDOW_STATE_TABLE) {
            self.storage.create_table(
                WINDOW_STATE_TABLE,
                &[DataField::new("uid", FieldType::Varchar)],
            )?;
        }
        Ok(())
    }

    /// Register a source, inserting its never-triggered row.
    ///
    /// Idempotent: an existing row (for example across a configuration
    /// reload) is left untouched.
    pub fn register(&self, uid: &str) -> Result<(), StorageError> {
        self.ensure_table()?;
        if self.try_last_trigger(uid)?.is_some() {
            debug!("window state for '{}' already present, keeping it", uid);
            return Ok(());
        }
        self.storage.execute_update(&format!(
            "INSERT INTO {} (uid, timed) VALUES ('{}', {})",
            WINDOW_STATE_TABLE, uid, NEVER_TRIGGERED
        ))?;
        Ok(())
    }

    /// The statement advancing a source's trigger instant. The ingest path
    /// batches it with the raw insert into one atomic unit.
    pub fn advance_statement(uid: &str, timestamp: i64) -> String {
        format!(
            "UPDATE {} SET timed = {} WHERE uid = '{}'",
            WINDOW_STATE_TABLE, timestamp, uid
        )
    }

    /// Last trigger instant for a source; errors if it was never registered.
    pub fn last_trigger(&self, uid: &str) -> Result<i64, StorageError> {
        self.try_last_trigger(uid)?.ok_or_else(|| {
            StorageError::execution(
                format!("SELECT timed FROM {} WHERE uid = '{}'", WINDOW_STATE_TABLE, uid),
                "no window state registered for this uid",
            )
        })
    }

    /// Last trigger instant, or `None` when the uid has no state row.
    pub fn try_last_trigger(&self, uid: &str) -> Result<Option<i64>, StorageError> {
        let rs = self.storage.execute_query_with_result_set(&format!(
            "SELECT timed FROM {} WHERE uid = '{}'",
            WINDOW_STATE_TABLE, uid
        ))?;
        Ok(rs.long(0, "timed"))
    }

    /// Delete a source's state row. Called from explicit teardown only,
    /// never from listener deregistration.
    pub fn remove(&self, uid: &str) -> Result<(), StorageError> {
        self.storage.execute_update(&format!(
            "DELETE FROM {} WHERE uid = '{}'",
            WINDOW_STATE_TABLE, uid
        ))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sluice::storage::MemoryStorage;
    use std::sync::Arc;

    fn store() -> WindowStateStore {
        WindowStateStore::new(Arc::new(MemoryStorage::new()))
    }

    #[test]
    fn test_register_defaults_to_never_triggered() {
        let store = store();
        store.register("ss_1").unwrap();
        assert_eq!(store.last_trigger("ss_1").unwrap(), NEVER_TRIGGERED);
    }

    #[test]
    fn test_register_is_idempotent() {
        let store = store();
        store.register("ss_1").unwrap();
        store
            .storage
            .execute_update(&WindowStateStore::advance_statement("ss_1", 4200))
            .unwrap();
        store.register("ss_1").unwrap();
        assert_eq!(store.last_trigger("ss_1").unwrap(), 4200);
    }

    #[test]
    fn test_rows_are_independent_per_uid() {
        let store = store();
        store.register("ss_1").unwrap();
        store.register("ss_2").unwrap();
        store
            .storage
            .execute_update(&WindowStateStore::advance_statement("ss_1", 9000))
            .unwrap();
        assert_eq!(store.last_trigger("ss_1").unwrap(), 9000);
        assert_eq!(store.last_trigger("ss_2").unwrap(), NEVER_TRIGGERED);
    }

    #[test]
    fn test_remove_then_read_errors() {
        let store = store();
        store.register("ss_1").unwrap();
        store.remove("ss_1").unwrap();
        assert!(store.last_trigger("ss_1").is_err());
    }
}
