//! Persistence layer: alarm table, remediation audit trail, process lock.
//!
//! Everything lives in one sled database under the configured data
//! directory, one named tree per concern. Values are JSON; keys are
//! big-endian integers so iteration order is meaningful.

pub mod alarms;
pub mod history;
pub mod lockfile;

pub use alarms::{AlarmStore, SledAlarmStore};
pub use history::RemediationLog;
pub use lockfile::ProcessLock;

use std::path::Path;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("alarm record {0} not found")]
    AlarmNotFound(u64),
}

/// Open (or create) the daemon's database under `data_dir`.
pub fn open_db<P: AsRef<Path>>(data_dir: P) -> Result<sled::Db, StorageError> {
    let db = sled::open(data_dir.as_ref().join("procwarden.db"))?;
    Ok(db)
}
