//! Sync orchestrator.
//!
//! Runs the fixed step sequence (range import, today sync, pending
//! enrichment, active enrichment, FX linking) under a lease lock so at
//! most one full run is ever in flight. Each step gets a timeout and a
//! bounded retry with doubling backoff; a failed step is recorded and
//! the sequence continues. A global deadline skips whatever steps
//! remain. The lock lease is refreshed between steps and always
//! released at the end.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Days, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use lodgex_db::lock::{AcquireOutcome, LeaseLock, LockToken};

use crate::enrich::{EnrichOptions, EnrichSelection, EnrichmentMerger};
use crate::error::{SyncError, SyncResult};
use crate::fx_link::{FxLinkEngine, LinkOptions};
use crate::upsert::{ImportJob, UpsertOptions};

/// Mutual-exclusion provider guarding a full run.
#[async_trait]
pub trait LockProvider: Send + Sync {
    /// Lock name, used in conflict errors.
    fn name(&self) -> &str;
    /// Try to take the lock for `ttl`.
    async fn acquire(&self, ttl: Duration) -> SyncResult<AcquireOutcome>;
    /// Extend a held lease.
    async fn refresh(&self, token: LockToken, ttl: Duration) -> SyncResult<bool>;
    /// Release a held lease.
    async fn release(&self, token: LockToken) -> SyncResult<()>;
}

#[async_trait]
impl LockProvider for LeaseLock {
    fn name(&self) -> &str {
        self.name()
    }
    async fn acquire(&self, ttl: Duration) -> SyncResult<AcquireOutcome> {
        Ok(LeaseLock::acquire(self, ttl).await?)
    }
    async fn refresh(&self, token: LockToken, ttl: Duration) -> SyncResult<bool> {
        Ok(LeaseLock::refresh(self, token, ttl).await?)
    }
    async fn release(&self, token: LockToken) -> SyncResult<()> {
        Ok(LeaseLock::release(self, token).await?)
    }
}

/// One unit of the orchestrated sequence.
#[async_trait]
pub trait SyncStep: Send + Sync {
    /// Step name, used in the report and logs.
    fn name(&self) -> &'static str;
    /// Execute the step, returning its JSON summary.
    async fn run(&self, dry_run: bool) -> SyncResult<Value>;
}

/// Options for an orchestrated run.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Plan every step but write nothing.
    pub dry_run: bool,
    /// Lock lease duration; refreshed between steps.
    pub lock_ttl: Duration,
    /// Per-attempt step timeout.
    pub step_timeout: Duration,
    /// Global deadline for the whole sequence.
    pub total_timeout: Duration,
    /// Extra attempts after the first failure.
    pub retries: u32,
    /// First retry delay; doubles per attempt.
    pub backoff_base: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            lock_ttl: Duration::from_secs(600),
            step_timeout: Duration::from_secs(300),
            total_timeout: Duration::from_secs(1500),
            retries: 2,
            backoff_base: Duration::from_secs(1),
        }
    }
}

/// Terminal state of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Step completed.
    Succeeded,
    /// Step failed on every attempt.
    Failed,
    /// Step never ran (global deadline reached).
    Skipped,
}

/// Report line for one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    /// Step name.
    pub name: &'static str,
    /// Terminal state.
    pub status: StepStatus,
    /// Attempts made (0 when skipped).
    pub attempts: u32,
    /// Wall time spent on this step across all attempts.
    pub duration_ms: u64,
    /// The step's own summary, on success.
    pub summary: Option<Value>,
    /// Last error text, on failure.
    pub error: Option<String>,
}

/// Report for one orchestrated run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// One result per configured step, in sequence order.
    pub steps: Vec<StepResult>,
}

impl RunReport {
    /// Whether no step failed (skipped steps do not count as failures).
    #[must_use]
    pub fn ok(&self) -> bool {
        self.steps.iter().all(|s| s.status != StepStatus::Failed)
    }
}

/// Lock-guarded runner for the fixed step sequence.
pub struct Orchestrator {
    lock: Arc<dyn LockProvider>,
    steps: Vec<Arc<dyn SyncStep>>,
}

impl Orchestrator {
    /// Create an orchestrator over a lock and an ordered step list.
    #[must_use]
    pub fn new(lock: Arc<dyn LockProvider>, steps: Vec<Arc<dyn SyncStep>>) -> Self {
        Self { lock, steps }
    }

    /// The production sequence: range import (a week back, a month
    /// ahead), today sync, pending enrichment, active enrichment, FX
    /// linking.
    #[must_use]
    pub fn standard(
        lock: Arc<dyn LockProvider>,
        job: Arc<ImportJob>,
        merger: Arc<EnrichmentMerger>,
        fx: Arc<FxLinkEngine>,
    ) -> Self {
        let steps: Vec<Arc<dyn SyncStep>> = vec![
            Arc::new(ImportByArrivalStep::new(job.clone(), 7, 30)),
            Arc::new(SyncTodayStep::new(job)),
            Arc::new(EnrichStep::pending(merger.clone())),
            Arc::new(EnrichStep::active(merger)),
            Arc::new(FxLinkStep::new(fx)),
        ];
        Self::new(lock, steps)
    }

    /// Run the whole sequence under the lock.
    ///
    /// Fails fast with [`SyncError::Conflict`] when another run holds
    /// the lock; never waits for it.
    #[instrument(skip(self, options), fields(dry_run = options.dry_run))]
    pub async fn run(&self, options: &RunOptions) -> SyncResult<RunReport> {
        let token = match self.lock.acquire(options.lock_ttl).await? {
            AcquireOutcome::Acquired(token) => token,
            AcquireOutcome::Conflict { held_since } => {
                return Err(SyncError::Conflict {
                    name: self.lock.name().to_string(),
                    held_since,
                });
            }
        };

        let report = self.run_steps(token, options).await;
        if let Err(err) = self.lock.release(token).await {
            error!(lock = self.lock.name(), error = %err, "Lock release failed");
        }
        info!(
            ok = report.ok(),
            steps = report.steps.len(),
            "Orchestrated run finished"
        );
        Ok(report)
    }

    async fn run_steps(&self, token: LockToken, options: &RunOptions) -> RunReport {
        let started_at = Utc::now();
        let deadline = tokio::time::Instant::now() + options.total_timeout;
        let mut results = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            if tokio::time::Instant::now() >= deadline {
                warn!(step = step.name(), "Global deadline reached, skipping");
                results.push(StepResult {
                    name: step.name(),
                    status: StepStatus::Skipped,
                    attempts: 0,
                    duration_ms: 0,
                    summary: None,
                    error: None,
                });
                continue;
            }

            results.push(run_step(step.as_ref(), options, deadline).await);

            match self.lock.refresh(token, options.lock_ttl).await {
                Ok(true) => {}
                Ok(false) => warn!(lock = self.lock.name(), "Lease lost mid-run"),
                Err(err) => warn!(lock = self.lock.name(), error = %err, "Lease refresh failed"),
            }
        }

        RunReport {
            started_at,
            finished_at: Utc::now(),
            steps: results,
        }
    }
}

/// Run one step with per-attempt timeout and doubling backoff.
async fn run_step(
    step: &dyn SyncStep,
    options: &RunOptions,
    deadline: tokio::time::Instant,
) -> StepResult {
    let started = std::time::Instant::now();
    let mut attempts = 0;
    let mut backoff = options.backoff_base;
    let mut last_error = String::new();

    while attempts <= options.retries {
        attempts += 1;
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let budget = options.step_timeout.min(remaining);
        if budget.is_zero() {
            last_error = "global deadline reached".to_string();
            break;
        }

        match tokio::time::timeout(budget, step.run(options.dry_run)).await {
            Ok(Ok(summary)) => {
                info!(step = step.name(), attempts, "Step succeeded");
                return StepResult {
                    name: step.name(),
                    status: StepStatus::Succeeded,
                    attempts,
                    duration_ms: started.elapsed().as_millis() as u64,
                    summary: Some(summary),
                    error: None,
                };
            }
            Ok(Err(err)) => {
                warn!(step = step.name(), attempt = attempts, error = %err, "Step failed");
                last_error = err.to_string();
            }
            Err(_) => {
                warn!(step = step.name(), attempt = attempts, "Step timed out");
                last_error = format!("timed out after {budget:?}");
            }
        }

        if attempts <= options.retries {
            tokio::time::sleep(backoff).await;
            backoff *= 2;
        }
    }

    StepResult {
        name: step.name(),
        status: StepStatus::Failed,
        attempts,
        duration_ms: started.elapsed().as_millis() as u64,
        summary: None,
        error: Some(last_error),
    }
}

/// Import reservations arriving in a window around today.
pub struct ImportByArrivalStep {
    job: Arc<ImportJob>,
    /// Days before today the window starts.
    pub lookback_days: u64,
    /// Days after today the window ends.
    pub lookahead_days: u64,
}

impl ImportByArrivalStep {
    /// Create the step with its arrival window.
    #[must_use]
    pub fn new(job: Arc<ImportJob>, lookback_days: u64, lookahead_days: u64) -> Self {
        Self {
            job,
            lookback_days,
            lookahead_days,
        }
    }
}

#[async_trait]
impl SyncStep for ImportByArrivalStep {
    fn name(&self) -> &'static str {
        "import_by_arrival"
    }

    async fn run(&self, dry_run: bool) -> SyncResult<Value> {
        let today = Utc::now().date_naive();
        let since = today
            .checked_sub_days(Days::new(self.lookback_days))
            .unwrap_or(today);
        let until = today
            .checked_add_days(Days::new(self.lookahead_days))
            .unwrap_or(today);
        let report = self
            .job
            .import_by_arrival(since, until, &UpsertOptions { dry_run })
            .await?;
        Ok(serde_json::to_value(report).map_err(lodgex_db::DbError::from)?)
    }
}

/// Import reservations active today.
pub struct SyncTodayStep {
    job: Arc<ImportJob>,
}

impl SyncTodayStep {
    /// Create the step.
    #[must_use]
    pub fn new(job: Arc<ImportJob>) -> Self {
        Self { job }
    }
}

#[async_trait]
impl SyncStep for SyncTodayStep {
    fn name(&self) -> &'static str {
        "sync_today"
    }

    async fn run(&self, dry_run: bool) -> SyncResult<Value> {
        let report = self.job.sync_today(&UpsertOptions { dry_run }).await?;
        Ok(serde_json::to_value(report).map_err(lodgex_db::DbError::from)?)
    }
}

/// Enrich a batch of reservations.
pub struct EnrichStep {
    merger: Arc<EnrichmentMerger>,
    selection: EnrichSelection,
    name: &'static str,
}

impl EnrichStep {
    /// Enrich reservations whose enrichment has not completed yet.
    #[must_use]
    pub fn pending(merger: Arc<EnrichmentMerger>) -> Self {
        Self {
            merger,
            selection: EnrichSelection::Pending,
            name: "enrich_pending",
        }
    }

    /// Re-sync supplementary data for active reservations.
    #[must_use]
    pub fn active(merger: Arc<EnrichmentMerger>) -> Self {
        Self {
            merger,
            selection: EnrichSelection::Active,
            name: "enrich_active",
        }
    }
}

#[async_trait]
impl SyncStep for EnrichStep {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn run(&self, dry_run: bool) -> SyncResult<Value> {
        let options = EnrichOptions {
            dry_run,
            ..Default::default()
        };
        let summary = self.merger.enrich(self.selection.clone(), &options).await?;
        Ok(serde_json::to_value(summary).map_err(lodgex_db::DbError::from)?)
    }
}

/// Advance FX linking from its watermark.
pub struct FxLinkStep {
    engine: Arc<FxLinkEngine>,
}

impl FxLinkStep {
    /// Create the step.
    #[must_use]
    pub fn new(engine: Arc<FxLinkEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl SyncStep for FxLinkStep {
    fn name(&self) -> &'static str {
        "fx_link"
    }

    async fn run(&self, dry_run: bool) -> SyncResult<Value> {
        let options = LinkOptions {
            dry_run,
            ..Default::default()
        };
        let summary = self.engine.link(&options).await?;
        Ok(serde_json::to_value(summary).map_err(lodgex_db::DbError::from)?)
    }
}
