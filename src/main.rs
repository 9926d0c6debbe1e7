//! procwarden - process alarm remediation daemon
//!
//! Polls the persisted alarm table for processes flagged as unhealthy,
//! restarts each one (managed-service restart first, raw terminate +
//! relaunch as fallback), and acknowledges the alarm on success. A
//! per-process circuit breaker keeps flapping restarts from escalating.
//!
//! # Usage
//!
//! ```bash
//! # Run the daemon in the foreground
//! procwarden
//!
//! # Run exactly one poll cycle and exit
//! procwarden --once
//!
//! # Raise a test alarm, inspect state (daemon stopped)
//! procwarden raise --process nginx
//! procwarden list
//! procwarden history --limit 20
//! ```
//!
//! # Environment Variables
//!
//! - `PROCWARDEN_CONFIG`: path to the TOML config file
//! - `RUST_LOG`: logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use procwarden::config::{self, defaults, MonitorConfig};
use procwarden::{
    AlarmStore, CircuitBreaker, MonitorLoop, ProcessLock, RemediationLog, RestartExecutor,
    SledAlarmStore, SystemProcessControl,
};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "procwarden")]
#[command(about = "Process alarm remediation daemon")]
#[command(version)]
struct CliArgs {
    /// Path to the config file (overrides the PROCWARDEN_CONFIG search order)
    #[arg(short, long)]
    config: Option<String>,

    /// Run exactly one poll cycle and exit (for smoke tests and cron-style use)
    #[arg(long)]
    once: bool,

    #[command(subcommand)]
    command: Option<SubCommand>,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Insert an alarm for a process name (stands in for the alarm producer)
    Raise {
        /// Process name to flag as unhealthy
        #[arg(long)]
        process: String,

        /// Initial audit note
        #[arg(long, default_value = "raised manually")]
        note: String,
    },

    /// List unacknowledged alarms
    List,

    /// Show recent remediation history
    History {
        /// Maximum number of entries to show
        #[arg(long, default_value_t = defaults::HISTORY_LIST_LIMIT)]
        limit: usize,
    },
}

// ============================================================================
// Subcommands
// ============================================================================

fn run_raise(store: &SledAlarmStore, process: &str, note: &str) -> Result<()> {
    let id = store
        .insert(process, note)
        .context("Failed to insert alarm")?;
    println!("Raised alarm {id} for process '{process}'");
    Ok(())
}

fn run_list(store: &SledAlarmStore) -> Result<()> {
    let pending = store.fetch_alarms().context("Failed to query alarms")?;
    if pending.is_empty() {
        println!("No unacknowledged alarms.");
        return Ok(());
    }
    println!("{:<8} {:<24} {:<28} NOTES", "ID", "PROCESS", "RAISED AT");
    for rec in pending {
        println!(
            "{:<8} {:<24} {:<28} {}",
            rec.id,
            rec.process_name,
            rec.raised_at.to_rfc3339(),
            rec.notes.lines().next().unwrap_or("")
        );
    }
    Ok(())
}

fn run_history(log: &RemediationLog, limit: usize) -> Result<()> {
    let events = log.recent(limit);
    if events.is_empty() {
        println!("No remediation history.");
        return Ok(());
    }
    println!(
        "{:<28} {:<24} {:<10} {:<20} DETAIL",
        "AT", "PROCESS", "RESULT", "STRATEGY"
    );
    for ev in events {
        println!(
            "{:<28} {:<24} {:<10} {:<20} {}",
            ev.at.to_rfc3339(),
            ev.process_name,
            if ev.success { "ok" } else { "FAILED" },
            ev.strategy.map_or_else(|| "-".to_string(), |s| s.to_string()),
            ev.detail
        );
    }
    Ok(())
}

// ============================================================================
// Daemon
// ============================================================================

/// Spawn the signal handler task: Ctrl-C or SIGTERM cancels the token.
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "Failed to install SIGTERM handler");
                    tokio::signal::ctrl_c().await.ok();
                    info!("🛑 Received Ctrl+C, initiating shutdown...");
                    cancel.cancel();
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("🛑 Received Ctrl+C, initiating shutdown..."),
                _ = sigterm.recv() => info!("🛑 Received SIGTERM, initiating shutdown..."),
            }
        }
        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await.ok();
            info!("🛑 Received Ctrl+C, initiating shutdown...");
        }
        cancel.cancel();
    });
}

async fn run_daemon(store: SledAlarmStore, history: RemediationLog, once: bool) -> Result<()> {
    let cfg = config::get();

    match history.prune_older_than(defaults::HISTORY_RETENTION_DAYS) {
        Ok(0) => {}
        Ok(n) => info!(
            "Pruned {} remediation events older than {} days",
            n,
            defaults::HISTORY_RETENTION_DAYS
        ),
        Err(e) => warn!(error = %e, "Failed to prune old remediation history"),
    }

    let executor = RestartExecutor::new(Arc::new(SystemProcessControl::new()));
    let breaker = CircuitBreaker::new(cfg.monitor.max_restart_failures, cfg.circuit_reset());
    let mut monitor = MonitorLoop::new(
        Arc::new(store),
        executor,
        breaker,
        history,
        cfg.check_interval(),
    );

    if once {
        let stats = monitor.run_cycle().await;
        info!(
            fetched = stats.fetched,
            remediated = stats.remediated,
            blocked = stats.blocked,
            failed = stats.failed,
            "Single cycle complete"
        );
        return Ok(());
    }

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());
    monitor.run(cancel).await;
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    // Settings are validated before anything touches storage or processes;
    // an out-of-range value is fatal here.
    let monitor_config = match &args.config {
        Some(path) => MonitorConfig::load_from_file(std::path::Path::new(path))?,
        None => MonitorConfig::load()?,
    };
    config::init(monitor_config);
    let cfg = config::get();

    let data_dir = cfg.storage.data_dir.clone();

    // Subcommand dispatch — these open the store directly and exit.
    if let Some(command) = &args.command {
        let db = Arc::new(procwarden::storage::open_db(&data_dir)?);
        let store = SledAlarmStore::open(Arc::clone(&db))?;
        return match command {
            SubCommand::Raise { process, note } => run_raise(&store, process, note),
            SubCommand::List => run_list(&store),
            SubCommand::History { limit } => {
                let log = RemediationLog::open(&db)?;
                run_history(&log, *limit)
            }
        };
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  procwarden — process alarm remediation daemon");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!(
        "Poll interval: {}s | Failure threshold: {} | Circuit reset: {}s",
        cfg.monitor.check_interval_secs,
        cfg.monitor.max_restart_failures,
        cfg.monitor.circuit_reset_secs
    );

    info!("🔒 Acquiring process lock...");
    let _process_lock =
        ProcessLock::acquire(&data_dir).context("Failed to acquire process lock")?;
    info!("✓ Process lock acquired");

    let db = Arc::new(
        procwarden::storage::open_db(&data_dir).context("Failed to open alarm database")?,
    );
    let store = SledAlarmStore::open(Arc::clone(&db)).context("Failed to open alarm table")?;
    let history = RemediationLog::open(&db).context("Failed to open remediation history")?;
    info!("✓ Alarm storage initialized at {data_dir}");

    run_daemon(store, history, args.once).await?;

    info!("✓ procwarden shutdown complete");
    Ok(())
}
