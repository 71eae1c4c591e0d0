//! Periodic cleanup of unconfirmed accounts and invalidated token records.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::store::{AuthStore, PrincipalStore, TokenStore};

/// Sweeper configuration.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Fixed period between cycles (no jitter). The first cycle runs at spawn.
    pub interval: Duration,
    /// How long an account may stay unconfirmed before it is deleted.
    /// Zero deletes every unconfirmed account on each cycle.
    pub unconfirmed_grace: chrono::Duration,
    /// Name for logging
    pub name: String,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(24 * 60 * 60),
            unconfirmed_grace: chrono::Duration::zero(),
            name: "expiry-sweeper".to_string(),
        }
    }
}

impl SweeperConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_unconfirmed_grace(mut self, grace: chrono::Duration) -> Self {
        self.unconfirmed_grace = grace;
        self
    }
}

/// Outcome of one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub principals_removed: u64,
    pub tokens_purged: u64,
    /// Jobs of this cycle that failed (0..=2).
    pub failed_jobs: u32,
}

/// Totals since spawn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweeperStats {
    pub cycles: u64,
    pub principals_removed: u64,
    pub tokens_purged: u64,
    pub failed_jobs: u64,
}

impl SweeperStats {
    fn record(&mut self, report: &SweepReport) {
        self.cycles += 1;
        self.principals_removed += report.principals_removed;
        self.tokens_purged += report.tokens_purged;
        self.failed_jobs += u64::from(report.failed_jobs);
    }
}

/// Handle to control a running sweeper.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
    stats: Arc<Mutex<SweeperStats>>,
}

impl SweeperHandle {
    /// Stop after the current cycle and wait for the task to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }

    pub fn stats(&self) -> SweeperStats {
        match self.stats.lock() {
            Ok(stats) => *stats,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

pub struct ExpirySweeper {
    store: Arc<dyn AuthStore>,
    config: SweeperConfig,
}

impl ExpirySweeper {
    pub fn new(store: Arc<dyn AuthStore>, config: SweeperConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &SweeperConfig {
        &self.config
    }

    /// Delete unconfirmed principals older than the grace window, with their tokens.
    pub async fn purge_unconfirmed(&self) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - self.config.unconfirmed_grace;
        self.store.delete_unconfirmed(cutoff).await
    }

    pub async fn purge_tokens(&self) -> Result<u64, StoreError> {
        self.store.purge_revoked_or_expired().await
    }

    /// Run both jobs once. A failing job is logged and does not stop the other.
    pub async fn run_once(&self) -> SweepReport {
        let mut report = SweepReport::default();

        match self.purge_unconfirmed().await {
            Ok(n) => report.principals_removed = n,
            Err(e) => {
                report.failed_jobs += 1;
                warn!(sweeper = %self.config.name, error = %e, "unconfirmed account purge failed");
            }
        }

        match self.purge_tokens().await {
            Ok(n) => report.tokens_purged = n,
            Err(e) => {
                report.failed_jobs += 1;
                warn!(sweeper = %self.config.name, error = %e, "token purge failed");
            }
        }

        info!(
            sweeper = %self.config.name,
            principals_removed = report.principals_removed,
            tokens_purged = report.tokens_purged,
            "sweep cycle finished"
        );
        report
    }

    /// Spawn the sweeper on the current tokio runtime.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let stats = Arc::new(Mutex::new(SweeperStats::default()));
        let stats_clone = stats.clone();

        let join = tokio::spawn(sweeper_loop(self, shutdown_rx, stats_clone));

        SweeperHandle {
            shutdown: Some(shutdown_tx),
            join: Some(join),
            stats,
        }
    }
}

async fn sweeper_loop(
    sweeper: ExpirySweeper,
    mut shutdown_rx: oneshot::Receiver<()>,
    stats: Arc<Mutex<SweeperStats>>,
) {
    info!(
        sweeper = %sweeper.config.name,
        interval_secs = sweeper.config.interval.as_secs(),
        grace_secs = sweeper.config.unconfirmed_grace.num_seconds(),
        "expiry sweeper started"
    );

    let mut ticker = tokio::time::interval(sweeper.config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                debug!(sweeper = %sweeper.config.name, "shutdown requested");
                break;
            }
            _ = ticker.tick() => {
                let report = sweeper.run_once().await;
                match stats.lock() {
                    Ok(mut s) => s.record(&report),
                    Err(poisoned) => poisoned.into_inner().record(&report),
                }
            }
        }
    }

    info!(sweeper = %sweeper.config.name, "expiry sweeper stopped");
}
