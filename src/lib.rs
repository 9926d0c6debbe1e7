//! Procwarden: process alarm remediation daemon
//!
//! Polls a persisted alarm table for processes reported as unhealthy,
//! restarts each one (managed-service restart first, raw terminate +
//! relaunch as the fallback), and acknowledges the alarm on success.
//! A per-process circuit breaker stops flapping restarts from escalating.
//!
//! ## Architecture
//!
//! - **Storage**: sled-backed alarm table and remediation audit trail
//! - **Circuit Breaker**: per-process-name failure accounting with cooldown
//! - **Restart Executor**: two-tier remediation over a `ProcessControl` seam
//! - **Monitor Loop**: fetch -> gate -> restart -> record -> acknowledge

pub mod breaker;
pub mod config;
pub mod executor;
pub mod monitor;
pub mod storage;
pub mod types;

// Re-export configuration
pub use config::MonitorConfig;

// Re-export commonly used types
pub use types::{AlarmRecord, RemediationEvent, RestartStrategy};

// Re-export core components
pub use breaker::{BreakerStatus, CircuitBreaker};
pub use executor::{ProcessControl, RestartError, RestartExecutor, SystemProcessControl};
pub use monitor::{CycleStats, MonitorLoop};

// Re-export storage
pub use storage::{AlarmStore, ProcessLock, RemediationLog, SledAlarmStore, StorageError};
