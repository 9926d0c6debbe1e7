//! Alarm table persistence
//!
//! Stores alarm records in a named sled tree ("alarms"), keyed by
//! storage-assigned id (big-endian u64, so iteration follows insertion
//! order). Values are JSON-serialized `AlarmRecord`s.
//!
//! The monitor reads through the `AlarmStore` trait so the loop can be
//! tested against an in-memory fake; `SledAlarmStore` is the production
//! implementation.

use chrono::{DateTime, Utc};
use sled::Tree;
use std::sync::Arc;
use tracing::warn;

use super::StorageError;
use crate::types::AlarmRecord;

/// Query/command seam over the alarm table.
pub trait AlarmStore: Send + Sync {
    /// All records with `alarm_flag = true` and `acknowledged = false`,
    /// in insertion order. Undecodable or nameless records are skipped
    /// with a warning, never fatal.
    fn fetch_alarms(&self) -> Result<Vec<AlarmRecord>, StorageError>;

    /// Clear `alarm_flag`, set `acknowledged`, and append a timestamped
    /// audit note — one atomic single-key update.
    fn acknowledge(&self, id: u64, at: DateTime<Utc>) -> Result<(), StorageError>;

    /// Insert a new alarm for `process_name`; returns the assigned id.
    fn insert(&self, process_name: &str, note: &str) -> Result<u64, StorageError>;
}

/// sled-backed alarm table.
#[derive(Clone)]
pub struct SledAlarmStore {
    db: Arc<sled::Db>,
    tree: Tree,
}

impl SledAlarmStore {
    /// Tree name within the daemon database.
    const TREE_NAME: &'static str = "alarms";

    /// Open the alarm tree inside an already-open database.
    pub fn open(db: Arc<sled::Db>) -> Result<Self, StorageError> {
        let tree = db.open_tree(Self::TREE_NAME)?;
        Ok(Self { db, tree })
    }

    /// All records regardless of state, in insertion order. Used by the
    /// `list` subcommand and tests.
    pub fn all(&self) -> Result<Vec<AlarmRecord>, StorageError> {
        let mut records = Vec::new();
        for item in self.tree.iter() {
            let (key, value) = item?;
            match serde_json::from_slice::<AlarmRecord>(&value) {
                Ok(rec) => records.push(rec),
                Err(e) => {
                    warn!(key = ?key, error = %e, "Skipping undecodable alarm record");
                }
            }
        }
        Ok(records)
    }
}

impl AlarmStore for SledAlarmStore {
    fn fetch_alarms(&self) -> Result<Vec<AlarmRecord>, StorageError> {
        let mut pending = Vec::new();
        for item in self.tree.iter() {
            let (key, value) = item?;
            let rec = match serde_json::from_slice::<AlarmRecord>(&value) {
                Ok(rec) => rec,
                Err(e) => {
                    warn!(key = ?key, error = %e, "Skipping undecodable alarm record");
                    continue;
                }
            };
            if rec.process_name.trim().is_empty() {
                warn!(id = rec.id, "Skipping alarm record with empty process name");
                continue;
            }
            if rec.is_pending() {
                pending.push(rec);
            }
        }
        Ok(pending)
    }

    fn acknowledge(&self, id: u64, at: DateTime<Utc>) -> Result<(), StorageError> {
        // fetch_and_update retries on contention, so the closure must be
        // a pure function of the old value.
        let previous = self.tree.fetch_and_update(id.to_be_bytes(), |old| {
            let bytes = old?;
            match serde_json::from_slice::<AlarmRecord>(bytes) {
                Ok(mut rec) => {
                    rec.alarm_flag = false;
                    rec.acknowledged = true;
                    if !rec.notes.is_empty() {
                        rec.notes.push('\n');
                    }
                    rec.notes.push_str(&format!(
                        "[{}] restarted and acknowledged by procwarden",
                        at.to_rfc3339()
                    ));
                    // An encode failure here would lose the record; keep
                    // the old bytes instead.
                    serde_json::to_vec(&rec).ok().or_else(|| Some(bytes.to_vec()))
                }
                // Undecodable record: leave it untouched.
                Err(_) => Some(bytes.to_vec()),
            }
        })?;

        if previous.is_none() {
            return Err(StorageError::AlarmNotFound(id));
        }

        // No per-write flush; sled's background flushing is durable enough
        // for an audit flag that converges on the next poll anyway.
        Ok(())
    }

    fn insert(&self, process_name: &str, note: &str) -> Result<u64, StorageError> {
        let id = self.db.generate_id()?;
        let rec = AlarmRecord {
            id,
            process_name: process_name.to_string(),
            alarm_flag: true,
            acknowledged: false,
            notes: note.to_string(),
            raised_at: Utc::now(),
        };
        let value = serde_json::to_vec(&rec)?;
        self.tree.insert(id.to_be_bytes(), value)?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_store() -> (tempfile::TempDir, SledAlarmStore) {
        let dir = tempdir().unwrap();
        let db = Arc::new(crate::storage::open_db(dir.path()).unwrap());
        let store = SledAlarmStore::open(db).unwrap();
        (dir, store)
    }

    #[test]
    fn insert_then_fetch_returns_pending_alarm() {
        let (_dir, store) = open_store();
        let id = store.insert("svc-x", "flatline detected").unwrap();

        let pending = store.fetch_alarms().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        assert_eq!(pending[0].process_name, "svc-x");
        assert!(pending[0].alarm_flag);
        assert!(!pending[0].acknowledged);
    }

    #[test]
    fn fetch_preserves_insertion_order() {
        let (_dir, store) = open_store();
        let a = store.insert("svc-a", "").unwrap();
        let b = store.insert("svc-b", "").unwrap();
        let c = store.insert("svc-c", "").unwrap();

        let ids: Vec<u64> = store.fetch_alarms().unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![a, b, c]);
    }

    #[test]
    fn acknowledge_clears_flag_and_appends_note() {
        let (_dir, store) = open_store();
        let id = store.insert("svc-x", "first note").unwrap();

        store.acknowledge(id, Utc::now()).unwrap();

        let all = store.all().unwrap();
        assert_eq!(all.len(), 1);
        assert!(!all[0].alarm_flag);
        assert!(all[0].acknowledged);
        assert!(all[0].notes.starts_with("first note\n["));
        assert!(all[0].notes.contains("acknowledged by procwarden"));
    }

    #[test]
    fn acknowledged_alarm_is_not_reselected() {
        let (_dir, store) = open_store();
        let id = store.insert("svc-x", "").unwrap();
        store.acknowledge(id, Utc::now()).unwrap();

        assert!(store.fetch_alarms().unwrap().is_empty());
    }

    #[test]
    fn acknowledge_unknown_id_is_an_error() {
        let (_dir, store) = open_store();
        let err = store.acknowledge(42, Utc::now()).unwrap_err();
        assert!(matches!(err, StorageError::AlarmNotFound(42)));
    }

    #[test]
    fn undecodable_record_is_skipped_not_fatal() {
        let (_dir, store) = open_store();
        store.insert("svc-x", "").unwrap();
        // Simulate a corrupt row written by a buggy producer.
        store
            .tree
            .insert(9_999_u64.to_be_bytes(), &b"not json"[..])
            .unwrap();

        let pending = store.fetch_alarms().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].process_name, "svc-x");
    }

    #[test]
    fn empty_process_name_is_skipped() {
        let (_dir, store) = open_store();
        store.insert("", "no name").unwrap();
        store.insert("svc-y", "").unwrap();

        let pending = store.fetch_alarms().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].process_name, "svc-y");
    }
}
