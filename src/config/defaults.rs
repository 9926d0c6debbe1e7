//! System-wide default constants.
//!
//! Centralises every tunable and timeout in one place, grouped by subsystem.

// ============================================================================
// Monitor Loop
// ============================================================================

/// Seconds between poll cycles when no config file overrides it.
pub const CHECK_INTERVAL_SECS: u64 = 30;

/// Documented bounds for `monitor.check_interval_secs`.
pub const CHECK_INTERVAL_MIN_SECS: u64 = 5;
pub const CHECK_INTERVAL_MAX_SECS: u64 = 3_600;

/// Consecutive restart failures before a process's circuit opens.
pub const MAX_RESTART_FAILURES: u32 = 3;

/// Documented bounds for `monitor.max_restart_failures`.
pub const MAX_RESTART_FAILURES_MIN: u32 = 1;
pub const MAX_RESTART_FAILURES_MAX: u32 = 10;

/// Seconds an open circuit blocks restart attempts before resetting.
pub const CIRCUIT_RESET_SECS: u64 = 300;

/// Documented bounds for `monitor.circuit_reset_secs`.
pub const CIRCUIT_RESET_MIN_SECS: u64 = 30;
pub const CIRCUIT_RESET_MAX_SECS: u64 = 86_400;

// ============================================================================
// Restart Executor
// ============================================================================

/// Service manager binary invoked for the managed-service restart tier.
pub const SERVICE_MANAGER_BIN: &str = "systemctl";

/// Upper bound on a single `systemctl restart` invocation (seconds).
/// One unresponsive unit must not stall the whole poll cycle.
pub const SERVICE_RESTART_TIMEOUT_SECS: u64 = 30;

/// Pause between termination and relaunch so the OS can reap the old
/// process (milliseconds).
pub const REAP_GRACE_MS: u64 = 2_000;

// ============================================================================
// Storage
// ============================================================================

/// Data directory holding the sled database and the lock file.
pub const DATA_DIR: &str = "./data";

/// Remediation history entries older than this are pruned at startup.
pub const HISTORY_RETENTION_DAYS: i64 = 30;

/// Default number of entries shown by the `history` subcommand.
pub const HISTORY_LIST_LIMIT: usize = 50;
