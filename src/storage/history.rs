//! Remediation audit trail
//!
//! Append-only log of restart attempts in a named sled tree
//! ("remediation_history"). Keys are 12 bytes: big-endian epoch
//! milliseconds plus a per-log sequence suffix, so entries sort
//! chronologically and same-millisecond attempts never overwrite.

use chrono::Utc;
use sled::Tree;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::warn;

use super::StorageError;
use crate::types::RemediationEvent;

/// Append-only remediation history.
#[derive(Clone)]
pub struct RemediationLog {
    tree: Tree,
    seq: Arc<AtomicU32>,
}

impl RemediationLog {
    /// Tree name within the daemon database.
    const TREE_NAME: &'static str = "remediation_history";

    /// Open the history tree inside an already-open database.
    pub fn open(db: &sled::Db) -> Result<Self, StorageError> {
        let tree = db.open_tree(Self::TREE_NAME)?;
        Ok(Self {
            tree,
            seq: Arc::new(AtomicU32::new(0)),
        })
    }

    /// Append one event.
    pub fn record(&self, event: &RemediationEvent) -> Result<(), StorageError> {
        let millis = u64::try_from(event.at.timestamp_millis()).unwrap_or(0);
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);

        let mut key = [0u8; 12];
        key[..8].copy_from_slice(&millis.to_be_bytes());
        key[8..].copy_from_slice(&seq.to_be_bytes());

        let value = serde_json::to_vec(event)?;
        self.tree.insert(key, value)?;
        Ok(())
    }

    /// The most recent `limit` events, newest first.
    pub fn recent(&self, limit: usize) -> Vec<RemediationEvent> {
        let mut events = Vec::with_capacity(limit);
        for item in self.tree.iter().rev() {
            if events.len() >= limit {
                break;
            }
            if let Ok((_key, value)) = item {
                match serde_json::from_slice::<RemediationEvent>(&value) {
                    Ok(event) => events.push(event),
                    Err(e) => warn!(error = %e, "Skipping undecodable history entry"),
                }
            }
        }
        events
    }

    /// Delete events older than `days`. Returns the number removed.
    pub fn prune_older_than(&self, days: i64) -> Result<usize, StorageError> {
        let cutoff = Utc::now() - chrono::Duration::days(days);
        let cutoff_key = u64::try_from(cutoff.timestamp_millis())
            .unwrap_or(0)
            .to_be_bytes();

        let mut removed = 0;
        for item in self.tree.range(..cutoff_key) {
            let (key, _value) = item?;
            self.tree.remove(key)?;
            removed += 1;
        }
        Ok(removed)
    }
}
