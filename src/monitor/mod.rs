//! Monitor loop - the top-level remediation orchestrator
//!
//! Each poll cycle pulls unacknowledged alarms, and for every record in
//! sequence: consults the circuit breaker, runs the restart executor if
//! permitted, feeds the outcome back into the breaker, and acknowledges
//! the alarm on success. The batch is strictly sequential, so no two
//! restart attempts for the same process name can ever overlap and
//! breaker reads are never stale within a cycle.
//!
//! No error from one record aborts the batch; no error aborts the loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::breaker::CircuitBreaker;
use crate::executor::RestartExecutor;
use crate::storage::{AlarmStore, RemediationLog};
use crate::types::{AlarmRecord, RemediationEvent};

/// Counters for one poll cycle, logged at INFO after each batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// Alarms selected this cycle.
    pub fetched: usize,
    /// Restarts that succeeded and were acknowledged (or attempted to be).
    pub remediated: usize,
    /// Alarms skipped because the circuit was open.
    pub blocked: usize,
    /// Restarts that failed.
    pub failed: usize,
    /// Successful restarts whose acknowledgment write failed.
    pub ack_failures: usize,
}

/// The polling/dispatch loop tying alarm discovery to remediation.
pub struct MonitorLoop {
    store: Arc<dyn AlarmStore>,
    executor: RestartExecutor,
    breaker: CircuitBreaker,
    history: RemediationLog,
    poll_interval: Duration,
}

impl MonitorLoop {
    pub fn new(
        store: Arc<dyn AlarmStore>,
        executor: RestartExecutor,
        breaker: CircuitBreaker,
        history: RemediationLog,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            executor,
            breaker,
            history,
            poll_interval,
        }
    }

    /// Run until `cancel` fires. The first cycle starts immediately;
    /// cancellation is observed at the tick boundary, never mid-batch.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            "Monitor loop started"
        );

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycles = 0u64;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(cycles, "Monitor loop stopped");
                    return;
                }
                _ = interval.tick() => {
                    let stats = self.run_cycle().await;
                    cycles += 1;
                    if stats.fetched == 0 {
                        debug!(cycles, "Cycle complete — no pending alarms");
                    } else {
                        info!(
                            cycles,
                            fetched = stats.fetched,
                            remediated = stats.remediated,
                            blocked = stats.blocked,
                            failed = stats.failed,
                            ack_failures = stats.ack_failures,
                            "Cycle complete"
                        );
                    }
                }
            }
        }
    }

    /// Run one poll cycle to completion. A query failure is treated as an
    /// empty batch.
    pub async fn run_cycle(&mut self) -> CycleStats {
        let mut stats = CycleStats::default();

        let alarms = match self.store.fetch_alarms() {
            Ok(alarms) => alarms,
            Err(e) => {
                warn!(error = %e, "Alarm query failed — treating as empty batch");
                return stats;
            }
        };

        for alarm in alarms {
            stats.fetched += 1;
            self.handle_alarm(&alarm, &mut stats).await;
        }

        stats
    }

    /// Remediate one alarm: gate, restart, record, acknowledge.
    async fn handle_alarm(&mut self, alarm: &AlarmRecord, stats: &mut CycleStats) {
        let name = alarm.process_name.as_str();

        if !self.breaker.may_attempt(name) {
            stats.blocked += 1;
            return;
        }

        match self.executor.restart(name).await {
            Ok(strategy) => {
                self.breaker.record_outcome(name, true);
                stats.remediated += 1;

                if let Err(e) = self.store.acknowledge(alarm.id, Utc::now()) {
                    // The restart already happened; the record will be
                    // re-selected next cycle and converge then.
                    error!(
                        process = name,
                        alarm_id = alarm.id,
                        error = %e,
                        "Failed to acknowledge remediated alarm"
                    );
                    stats.ack_failures += 1;
                }

                self.append_history(alarm, Some(strategy), true, String::new());
            }
            Err(e) => {
                warn!(
                    process = name,
                    alarm_id = alarm.id,
                    error = %e,
                    "Restart failed"
                );
                self.breaker.record_outcome(name, false);
                stats.failed += 1;

                self.append_history(alarm, None, false, e.to_string());
            }
        }
    }

    fn append_history(
        &self,
        alarm: &AlarmRecord,
        strategy: Option<crate::types::RestartStrategy>,
        success: bool,
        detail: String,
    ) {
        let event = RemediationEvent {
            at: Utc::now(),
            alarm_id: alarm.id,
            process_name: alarm.process_name.clone(),
            strategy,
            success,
            detail,
        };
        if let Err(e) = self.history.record(&event) {
            warn!(error = %e, "Failed to append remediation history entry");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
