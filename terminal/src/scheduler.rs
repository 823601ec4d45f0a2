//! Background scheduler: owns the sync cadence, serializes cycles, and
//! exposes the control surface consumed by the shell/CLI layer.

use crate::config::Config;
use crate::db::{self, changelog, settings, PendingCounts, Pool};
use crate::error::{Result, SyncError};
use crate::now_ms;
use crate::pull::PullEngine;
use crate::push::PushEngine;
use crate::remote::RemoteStore;
use crate::resolver::{ConflictResolver, KindConflictStats};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use till_engine::{ChangeLogEntry, CycleReport, SyncReport, Watermarks};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Lower bound on the sync cadence.
pub const MIN_SYNC_INTERVAL_SECS: u64 = 30;

/// Which half of a cycle a forced sync runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Push,
    Pull,
    Both,
}

/// How the last cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleStatus {
    Success,
    Failed,
}

/// Running totals across all cycles of this scheduler instance.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStats {
    pub total_syncs: u64,
    pub successful_syncs: u64,
    pub failed_syncs: u64,
    pub last_sync_status: Option<CycleStatus>,
    pub last_sync_error: Option<String>,
    pub last_sync_time: Option<i64>,
}

/// Scheduler half of the status report.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub interval_secs: u64,
    pub stats: SyncStats,
}

/// The full status surface.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatusReport {
    pub scheduler: SchedulerStatus,
    pub connected: bool,
    pub pending: PendingCounts,
    pub conflicts: Vec<KindConflictStats>,
}

/// Health probe result.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub scheduler_running: bool,
    pub database: bool,
    pub connectivity: bool,
    pub last_sync_time: Option<i64>,
    pub pending_records: i64,
}

struct RuntimeState {
    running: bool,
    interval_secs: u64,
    shutdown: Option<watch::Sender<bool>>,
    interval_tx: Option<watch::Sender<u64>>,
    handle: Option<JoinHandle<()>>,
}

struct Inner<R> {
    pool: Pool,
    config: Config,
    push: PushEngine<R>,
    pull: PullEngine<R>,
    resolver: ConflictResolver<R>,
    /// Serializes cycles: scheduled and forced triggers share this guard
    cycle_guard: tokio::sync::Mutex<()>,
    watermarks: tokio::sync::Mutex<Watermarks>,
    stats: Mutex<SyncStats>,
    runtime: Mutex<RuntimeState>,
}

/// Drives sync cycles on a timer and serializes all cycle execution.
///
/// Cheap to clone; all clones share one state. The scheduler holds no
/// global state of its own, so several independent instances can coexist
/// in one process (as they do in tests).
pub struct SyncScheduler<R: RemoteStore> {
    inner: Arc<Inner<R>>,
}

impl<R: RemoteStore> Clone for SyncScheduler<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: RemoteStore + 'static> SyncScheduler<R> {
    pub fn new(pool: Pool, remote: Arc<R>, config: Config) -> Self {
        let push = PushEngine::new(pool.clone(), Arc::clone(&remote));
        let pull = PullEngine::new(pool.clone(), Arc::clone(&remote), config.windows);
        let resolver = ConflictResolver::new(pool.clone(), Arc::clone(&remote));
        let interval_secs = config.sync_interval_secs;

        Self {
            inner: Arc::new(Inner {
                pool,
                config,
                push,
                pull,
                resolver,
                cycle_guard: tokio::sync::Mutex::new(()),
                watermarks: tokio::sync::Mutex::new(Watermarks::new()),
                stats: Mutex::new(SyncStats::default()),
                runtime: Mutex::new(RuntimeState {
                    running: false,
                    interval_secs,
                    shutdown: None,
                    interval_tx: None,
                    handle: None,
                }),
            }),
        }
    }

    /// Start the background timer. Idempotent: starting a running
    /// scheduler is a logged no-op. The first cycle runs immediately.
    pub async fn start(&self) -> Result<()> {
        if self.is_running() {
            tracing::info!("sync scheduler is already running");
            return Ok(());
        }

        let interval_secs = settings::load_sync_interval(&self.inner.pool)
            .await?
            .unwrap_or(self.inner.config.sync_interval_secs);
        {
            let mut marks = self.inner.watermarks.lock().await;
            *marks = settings::load_watermarks(&self.inner.pool).await?;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (interval_tx, interval_rx) = watch::channel(interval_secs);
        let worker = self.clone();
        let handle = tokio::spawn(async move { worker.run_loop(shutdown_rx, interval_rx).await });

        {
            let mut runtime = self.inner.runtime.lock().unwrap();
            if runtime.running {
                // Lost a start race; retire the loop we just spawned
                shutdown_tx.send(true).ok();
                return Ok(());
            }
            runtime.running = true;
            runtime.interval_secs = interval_secs;
            runtime.shutdown = Some(shutdown_tx);
            runtime.interval_tx = Some(interval_tx);
            runtime.handle = Some(handle);
        }

        tracing::info!(interval_secs, "sync scheduler started");
        Ok(())
    }

    /// Stop the timer. Idempotent. Future fires are cancelled; a cycle
    /// already in flight is allowed to finish before this returns.
    pub async fn stop(&self) {
        let (shutdown, handle) = {
            let mut runtime = self.inner.runtime.lock().unwrap();
            if !runtime.running {
                tracing::info!("sync scheduler is not running");
                return;
            }
            runtime.running = false;
            runtime.interval_tx = None;
            (runtime.shutdown.take(), runtime.handle.take())
        };

        if let Some(shutdown) = shutdown {
            shutdown.send(true).ok();
        }
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "scheduler task ended abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.runtime.lock().unwrap().running
    }

    /// A snapshot of the running totals.
    pub fn stats(&self) -> SyncStats {
        self.inner.stats.lock().unwrap().clone()
    }

    async fn run_loop(
        self,
        mut shutdown_rx: watch::Receiver<bool>,
        mut interval_rx: watch::Receiver<u64>,
    ) {
        let mut ticker = make_ticker(*interval_rx.borrow());
        loop {
            tokio::select! {
                _ = ticker.tick() => self.run_scheduled_cycle().await,
                changed = interval_rx.changed() => match changed {
                    Ok(()) => {
                        let secs = *interval_rx.borrow();
                        ticker = make_ticker(secs);
                        tracing::info!(interval_secs = secs, "sync cadence re-armed");
                    }
                    Err(_) => break,
                },
                _ = shutdown_rx.changed() => break,
            }
        }
        tracing::info!("sync scheduler loop exited");
    }

    /// One timer fire. Never propagates errors; failures land in stats
    /// and the log so the scheduler keeps running.
    async fn run_scheduled_cycle(&self) {
        let Ok(_guard) = self.inner.cycle_guard.try_lock() else {
            tracing::debug!("sync cycle already in flight, timer fire skipped");
            return;
        };

        if !self.inner.push.check_connectivity().await {
            tracing::info!("remote store unreachable, skipping scheduled cycle");
            return;
        }

        let outcome = self.execute_cycle(Direction::Both).await;
        self.note_cycle(&outcome);
        match outcome {
            Ok(report) => tracing::info!(
                pushed = report.push.as_ref().map_or(0, SyncReport::total_success),
                pulled = report.pull.as_ref().map_or(0, SyncReport::total_success),
                conflicts = report.pull.as_ref().map_or(0, SyncReport::total_conflicts),
                auto_resolved = report.auto_resolved,
                duration_ms = report.duration_ms,
                "scheduled sync cycle finished"
            ),
            Err(e) => tracing::error!(error = %e, "scheduled sync cycle failed"),
        }
    }

    /// Run a cycle outside the timer. Rejected with `CycleInProgress`
    /// when a cycle is already executing.
    pub async fn force_sync(&self, direction: Direction) -> Result<CycleReport> {
        let _guard = self
            .inner
            .cycle_guard
            .try_lock()
            .map_err(|_| SyncError::CycleInProgress)?;

        if !self.inner.push.check_connectivity().await {
            return Err(SyncError::Connectivity(
                "remote store unreachable".to_string(),
            ));
        }

        let outcome = self.execute_cycle(direction).await;
        self.note_cycle(&outcome);
        outcome
    }

    /// The cycle body: push, then pull, then the low-severity conflict
    /// pass. Callers must hold the cycle guard.
    async fn execute_cycle(&self, direction: Direction) -> Result<CycleReport> {
        let started = Instant::now();
        let mut report = CycleReport::default();

        if matches!(direction, Direction::Push | Direction::Both) {
            report.push = Some(self.inner.push.push_all().await?);
        }

        if matches!(direction, Direction::Pull | Direction::Both) {
            let mut marks = self.inner.watermarks.lock().await;
            report.pull = Some(self.inner.pull.pull_all(&mut marks).await?);
            settings::save_watermarks(&self.inner.pool, &marks, now_ms()).await?;
        }

        if matches!(direction, Direction::Both) {
            report.auto_resolved = self
                .inner
                .resolver
                .auto_resolve_low_severity()
                .await?
                .resolved;
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        Ok(report)
    }

    fn note_cycle(&self, outcome: &Result<CycleReport>) {
        let mut stats = self.inner.stats.lock().unwrap();
        stats.total_syncs += 1;
        match outcome {
            Ok(_) => {
                stats.successful_syncs += 1;
                stats.last_sync_status = Some(CycleStatus::Success);
                stats.last_sync_error = None;
                stats.last_sync_time = Some(now_ms());
            }
            Err(e) => {
                stats.failed_syncs += 1;
                stats.last_sync_status = Some(CycleStatus::Failed);
                stats.last_sync_error = Some(e.to_string());
            }
        }
    }

    /// Change the sync cadence. Values below the minimum fail validation;
    /// accepted values are persisted and re-arm a running timer.
    pub async fn update_sync_interval(&self, secs: u64) -> Result<()> {
        if secs < MIN_SYNC_INTERVAL_SECS {
            return Err(SyncError::Validation(format!(
                "sync interval must be at least {MIN_SYNC_INTERVAL_SECS} seconds"
            )));
        }

        settings::save_sync_interval(&self.inner.pool, secs, now_ms()).await?;

        let mut runtime = self.inner.runtime.lock().unwrap();
        runtime.interval_secs = secs;
        if let Some(tx) = &runtime.interval_tx {
            tx.send(secs).ok();
        }
        tracing::info!(interval_secs = secs, "sync interval updated");
        Ok(())
    }

    /// The full status surface.
    pub async fn sync_status(&self) -> SyncStatusReport {
        let (running, interval_secs) = {
            let runtime = self.inner.runtime.lock().unwrap();
            (runtime.running, runtime.interval_secs)
        };
        let connected = self.inner.push.check_connectivity().await;
        let pending = db::pending_counts(&self.inner.pool).await.unwrap_or_default();
        let conflicts = self
            .inner
            .resolver
            .conflict_stats()
            .await
            .unwrap_or_default();

        SyncStatusReport {
            scheduler: SchedulerStatus {
                running,
                interval_secs,
                stats: self.stats(),
            },
            connected,
            pending,
            conflicts,
        }
    }

    /// Recent change-log entries, newest first.
    pub async fn sync_history(&self, limit: i64) -> Result<Vec<ChangeLogEntry>> {
        changelog::list_recent(&self.inner.pool, limit).await
    }

    /// Per-day activity tallies over the trailing window.
    pub async fn sync_statistics(&self, days: i64) -> Result<Vec<changelog::DailyCount>> {
        changelog::statistics(&self.inner.pool, days, now_ms()).await
    }

    /// Verify the local store, remote connectivity, and backlog size.
    pub async fn health_check(&self) -> HealthReport {
        let database = sqlx::query("SELECT 1")
            .execute(&self.inner.pool)
            .await
            .is_ok();
        let connectivity = self.inner.push.check_connectivity().await;
        let pending_records = db::pending_counts(&self.inner.pool)
            .await
            .map(|counts| counts.total)
            .unwrap_or_default();

        HealthReport {
            scheduler_running: self.is_running(),
            database,
            connectivity,
            last_sync_time: self.stats().last_sync_time,
            pending_records,
        }
    }

    /// Drop change-log entries older than the given number of days.
    pub async fn purge_change_log(&self, days: i64) -> Result<u64> {
        let purged = changelog::purge_older_than(&self.inner.pool, days, now_ms()).await?;
        if purged > 0 {
            tracing::info!(purged, "purged old sync log entries");
        }
        Ok(purged)
    }

    /// Forget all pull cursors, forcing a full re-pull on the next cycle.
    pub async fn reset_watermarks(&self) -> Result<()> {
        let mut marks = self.inner.watermarks.lock().await;
        marks.reset_all();
        settings::save_watermarks(&self.inner.pool, &marks, now_ms()).await
    }

    /// The push engine, for retry/manual-intervention flows.
    pub fn push_engine(&self) -> &PushEngine<R> {
        &self.inner.push
    }

    /// The pull engine, for forced single-record pulls.
    pub fn pull_engine(&self) -> &PullEngine<R> {
        &self.inner.pull
    }

    /// The conflict resolver, for the manual resolution surface.
    pub fn resolver(&self) -> &ConflictResolver<R> {
        &self.inner.resolver
    }
}

fn make_ticker(secs: u64) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval(Duration::from_secs(secs.max(1)));
    // A tick that lands during a long cycle fires once, late, instead of
    // bursting to catch up
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
