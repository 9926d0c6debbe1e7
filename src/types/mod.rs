//! Core data types shared across storage, executor, and monitor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One alarmed process instance pulled from storage.
///
/// Created by an external alarm producer, read by the monitor, cleared by
/// acknowledgment exactly once per successful remediation. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmRecord {
    /// Storage-assigned opaque identifier.
    pub id: u64,

    /// Process name — used both for OS-level lookup and as the
    /// circuit-breaker key.
    pub process_name: String,

    /// True while the alarm is unacknowledged.
    pub alarm_flag: bool,

    /// True once the monitor has handled this alarm.
    #[serde(default)]
    pub acknowledged: bool,

    /// Append-only audit trail for this alarm.
    #[serde(default)]
    pub notes: String,

    /// When the producer raised the alarm.
    pub raised_at: DateTime<Utc>,
}

impl AlarmRecord {
    /// Whether this record should be selected for remediation.
    pub fn is_pending(&self) -> bool {
        self.alarm_flag && !self.acknowledged
    }
}

/// Which remediation tier succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestartStrategy {
    /// `systemctl restart <name>` succeeded.
    ManagedService,
    /// The process was terminated by name and relaunched.
    Relaunched,
}

impl std::fmt::Display for RestartStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RestartStrategy::ManagedService => write!(f, "managed-service"),
            RestartStrategy::Relaunched => write!(f, "terminate+relaunch"),
        }
    }
}

/// One entry in the remediation audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationEvent {
    /// When the attempt finished.
    pub at: DateTime<Utc>,

    /// Alarm that triggered the attempt.
    pub alarm_id: u64,

    /// Process the attempt targeted.
    pub process_name: String,

    /// Tier that succeeded, if any.
    pub strategy: Option<RestartStrategy>,

    /// Whether the restart succeeded.
    pub success: bool,

    /// Failure detail or empty on success.
    #[serde(default)]
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_requires_flag_set_and_unacknowledged() {
        let mut rec = AlarmRecord {
            id: 1,
            process_name: "svc-x".to_string(),
            alarm_flag: true,
            acknowledged: false,
            notes: String::new(),
            raised_at: Utc::now(),
        };
        assert!(rec.is_pending());
        rec.acknowledged = true;
        assert!(!rec.is_pending());
        rec.acknowledged = false;
        rec.alarm_flag = false;
        assert!(!rec.is_pending());
    }

    #[test]
    fn strategy_display_names() {
        assert_eq!(RestartStrategy::ManagedService.to_string(), "managed-service");
        assert_eq!(RestartStrategy::Relaunched.to_string(), "terminate+relaunch");
    }
}
