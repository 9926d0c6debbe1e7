//! Restart executor - two-tier process remediation
//!
//! Tier 1 asks the service manager to restart the process by unit name.
//! Tier 2 terminates every running instance by name, waits a grace period
//! for the OS to reap them, and relaunches the executable detached.
//!
//! The executor never retries within a call: a failed step short-circuits
//! the rest and reports failure. Retry cadence belongs to the poll loop,
//! gated by the circuit breaker.
//!
//! The OS surface sits behind the `ProcessControl` trait so the executor
//! and the monitor loop can be exercised with a scripted fake.

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::defaults;
use crate::types::RestartStrategy;

/// Restart failure, tagged with the stage that failed.
#[derive(Debug, Error)]
pub enum RestartError {
    #[error("service manager restart failed for {name}: {details}")]
    ServiceManager { name: String, details: String },

    #[error("service manager restart timed out after {seconds}s for {name}")]
    ServiceManagerTimeout { name: String, seconds: u64 },

    #[error("no running process named {name} to terminate")]
    NoSuchProcess { name: String },

    #[error("termination failed for {name}: {details}")]
    Terminate { name: String, details: String },

    #[error("relaunch of {name} failed: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// OS-level process operations needed by the executor.
#[async_trait]
pub trait ProcessControl: Send + Sync {
    /// Restart `name` as a managed service (by unit name).
    async fn restart_service(&self, name: &str) -> Result<(), RestartError>;

    /// Send SIGTERM to every running process whose command name is exactly
    /// `name`. Returns the number of processes signalled; zero matches is
    /// an error.
    async fn terminate_by_name(&self, name: &str) -> Result<u32, RestartError>;

    /// Launch the executable `name` as a detached background process.
    /// Returns the new PID. Success means the spawn call itself did not
    /// fail — exit-code supervision beyond that is not performed.
    async fn spawn_detached(&self, name: &str) -> Result<u32, RestartError>;
}

// ============================================================================
// Production implementation
// ============================================================================

/// `ProcessControl` backed by systemctl, /proc, and kill(2).
pub struct SystemProcessControl {
    service_restart_timeout: Duration,
}

impl SystemProcessControl {
    pub fn new() -> Self {
        Self {
            service_restart_timeout: Duration::from_secs(
                defaults::SERVICE_RESTART_TIMEOUT_SECS,
            ),
        }
    }

    /// PIDs of all processes whose command name is exactly `name`,
    /// excluding our own.
    ///
    /// Name→target resolution: every exact match is part of the same
    /// remediation unit (pkill -x semantics). The kernel truncates
    /// /proc/<pid>/comm to 15 bytes, so the target is compared truncated
    /// the same way.
    fn pids_by_name(name: &str) -> Vec<i32> {
        let own_pid = std::process::id() as i32;
        let mut pids = Vec::new();

        let entries = match std::fs::read_dir("/proc") {
            Ok(entries) => entries,
            Err(_) => return pids,
        };

        for entry in entries.flatten() {
            let pid: i32 = match entry.file_name().to_str().and_then(|s| s.parse().ok()) {
                Some(pid) => pid,
                None => continue,
            };
            if pid == own_pid {
                continue;
            }
            let comm_path = format!("/proc/{pid}/comm");
            if let Ok(comm) = std::fs::read_to_string(&comm_path) {
                if comm_matches(&comm, name) {
                    pids.push(pid);
                }
            }
        }

        pids
    }
}

impl Default for SystemProcessControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Compare a /proc comm line against a process name, accounting for the
/// kernel's 15-byte comm truncation.
fn comm_matches(comm: &str, name: &str) -> bool {
    const TASK_COMM_LEN: usize = 15;
    let truncated = if name.len() > TASK_COMM_LEN {
        &name[..TASK_COMM_LEN]
    } else {
        name
    };
    comm.trim_end() == truncated
}

#[async_trait]
impl ProcessControl for SystemProcessControl {
    async fn restart_service(&self, name: &str) -> Result<(), RestartError> {
        let status = tokio::time::timeout(
            self.service_restart_timeout,
            Command::new(defaults::SERVICE_MANAGER_BIN)
                .arg("restart")
                .arg(name)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status(),
        )
        .await
        .map_err(|_| RestartError::ServiceManagerTimeout {
            name: name.to_string(),
            seconds: self.service_restart_timeout.as_secs(),
        })?
        .map_err(|e| RestartError::ServiceManager {
            name: name.to_string(),
            details: e.to_string(),
        })?;

        if status.success() {
            Ok(())
        } else {
            Err(RestartError::ServiceManager {
                name: name.to_string(),
                details: format!("exit status {status}"),
            })
        }
    }

    async fn terminate_by_name(&self, name: &str) -> Result<u32, RestartError> {
        let pids = Self::pids_by_name(name);
        if pids.is_empty() {
            return Err(RestartError::NoSuchProcess {
                name: name.to_string(),
            });
        }

        let mut signalled = 0u32;
        let mut last_error = None;
        for pid in pids {
            #[allow(unsafe_code)]
            let ret = unsafe { libc::kill(pid, libc::SIGTERM) };
            if ret == 0 {
                debug!(process = name, pid, "Sent SIGTERM");
                signalled += 1;
            } else {
                let err = std::io::Error::last_os_error();
                // ESRCH means the process exited between scan and signal.
                if err.raw_os_error() == Some(libc::ESRCH) {
                    signalled += 1;
                } else {
                    warn!(process = name, pid, error = %err, "Failed to signal process");
                    last_error = Some(err);
                }
            }
        }

        if signalled == 0 {
            return Err(RestartError::Terminate {
                name: name.to_string(),
                details: last_error
                    .map_or_else(|| "no process could be signalled".to_string(), |e| e.to_string()),
            });
        }
        Ok(signalled)
    }

    async fn spawn_detached(&self, name: &str) -> Result<u32, RestartError> {
        let child = Command::new(name)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| RestartError::Spawn {
                name: name.to_string(),
                source,
            })?;

        let pid = child.id().unwrap_or(0);
        // Dropping the handle leaves the child running; it inherits our
        // session, and exit-code supervision beyond spawn is out of scope.
        drop(child);
        Ok(pid)
    }
}

// ============================================================================
// Executor
// ============================================================================

/// Applies the two-tier restart strategy for one process at a time.
pub struct RestartExecutor {
    control: Arc<dyn ProcessControl>,
    reap_grace: Duration,
}

impl RestartExecutor {
    pub fn new(control: Arc<dyn ProcessControl>) -> Self {
        Self {
            control,
            reap_grace: Duration::from_millis(defaults::REAP_GRACE_MS),
        }
    }

    /// Override the post-termination grace period (tests use zero).
    pub fn with_reap_grace(mut self, grace: Duration) -> Self {
        self.reap_grace = grace;
        self
    }

    /// Restart `name`, trying the managed-service tier first and falling
    /// back to terminate + relaunch. Strictly ordered, no internal
    /// retries; the first failing step aborts the rest.
    pub async fn restart(&self, name: &str) -> Result<RestartStrategy, RestartError> {
        info!(process = name, "Attempting managed-service restart");
        match self.control.restart_service(name).await {
            Ok(()) => {
                info!(process = name, "Service manager restarted process");
                return Ok(RestartStrategy::ManagedService);
            }
            Err(e) => {
                warn!(
                    process = name,
                    error = %e,
                    "Managed-service restart failed — falling back to terminate+relaunch"
                );
            }
        }

        let signalled = self.control.terminate_by_name(name).await?;
        info!(process = name, signalled, "Terminated running instances");

        // Let the OS reap the terminated process before relaunching,
        // otherwise the new instance can race the old one for sockets
        // and pid files.
        tokio::time::sleep(self.reap_grace).await;

        let pid = self.control.spawn_detached(name).await?;
        info!(process = name, pid, "Relaunched process");
        Ok(RestartStrategy::Relaunched)
    }
}

// ============================================================================
// Tests
// ============================================================================
