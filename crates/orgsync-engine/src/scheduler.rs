//! Background schedules.
//!
//! A [`BackgroundScheduler`] drives one [`ScheduledJob`] on a fixed interval
//! inside a tokio task. Starting an already-running scheduler does nothing,
//! and a failing or panicking tick is logged without stopping the loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use orgsync_core::error::OrgSyncResult;
use orgsync_core::gateway::{
    DirectoryGateway, EventEnvelope, NotificationChannel, SecretStoreGateway,
    organization_group_key,
};
use orgsync_core::models::context::CallerContext;
use orgsync_core::models::finding::OrphanReport;
use orgsync_core::models::validation::ComprehensiveValidationResult;
use orgsync_core::repository::{OrganizationRepository, Repositories};
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cache::ResultCache;
use crate::cleanup::CleanupExecutor;
use crate::detector::OrphanDetector;
use crate::validator::StateSyncValidator;

/// Counts for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub organizations_processed: u64,
    pub organizations_failed: u64,
}

pub trait ScheduledJob: Send + Sync + 'static {
    fn name(&self) -> &'static str;
    fn run_tick(&self) -> impl Future<Output = OrgSyncResult<TickSummary>> + Send;
}

/// Which organizations a tick covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickScope {
    AllActiveOrganizations,
    Organization(Uuid),
}

struct Running {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct BackgroundScheduler<J: ScheduledJob> {
    job: Arc<J>,
    interval: Duration,
    running: Mutex<Option<Running>>,
    ticks: Arc<AtomicU64>,
}

impl<J: ScheduledJob> BackgroundScheduler<J> {
    pub fn new(job: Arc<J>, interval: Duration) -> Self {
        Self {
            job,
            interval,
            running: Mutex::new(None),
            ticks: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Spawn the loop on the current tokio runtime. Returns `false` when the
    /// schedule was already running.
    pub fn start(&self) -> bool {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return false;
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let job = Arc::clone(&self.job);
        let ticks = Arc::clone(&self.ticks);
        let period = self.interval.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(job = job.name(), interval_secs = period.as_secs(), "Schedule started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        let tick_job = Arc::clone(&job);
                        match tokio::spawn(async move { tick_job.run_tick().await }).await {
                            Ok(Ok(summary)) => info!(
                                job = job.name(),
                                processed = summary.organizations_processed,
                                failed = summary.organizations_failed,
                                "Scheduled tick finished"
                            ),
                            Ok(Err(e)) => error!(job = job.name(), error = %e, "Scheduled tick failed"),
                            Err(e) => error!(job = job.name(), error = %e, "Scheduled tick panicked"),
                        }
                        ticks.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            info!(job = job.name(), "Schedule stopped");
        });

        *running = Some(Running { shutdown, handle });
        true
    }

    /// Signal the loop and wait for it to exit. Returns `false` when nothing
    /// was running.
    pub async fn stop(&self) -> bool {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(running) = running else {
            return false;
        };
        let _ = running.shutdown.send(true);
        if let Err(e) = running.handle.await {
            warn!(job = self.job.name(), error = %e, "Schedule task ended abnormally");
        }
        true
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Ticks completed since construction.
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

async fn organizations_in_scope<R: Repositories>(repos: &R, scope: TickScope) -> OrgSyncResult<Vec<Uuid>> {
    match scope {
        TickScope::Organization(id) => Ok(vec![id]),
        TickScope::AllActiveOrganizations => Ok(repos
            .organizations()
            .list_active()
            .await?
            .into_iter()
            .map(|o| o.id)
            .collect()),
    }
}

async fn notify<N: NotificationChannel>(channel: &N, envelope: EventEnvelope) {
    let key = organization_group_key(envelope.organization_id);
    let event_type = envelope.event_type.clone();
    if let Err(e) = channel.publish(&key, envelope).await {
        warn!(group = %key, event_type = %event_type, error = %e, "Event delivery failed");
    }
}

/// Runs the state-sync validation for every organization in scope and keeps
/// the latest result per organization.
pub struct StateSyncJob<R, D, S, N>
where
    R: Repositories,
    D: DirectoryGateway,
    S: SecretStoreGateway,
    N: NotificationChannel,
{
    repos: Arc<R>,
    validator: Arc<StateSyncValidator<R, D, S>>,
    results: Arc<ResultCache<ComprehensiveValidationResult>>,
    channel: Arc<N>,
    scope: TickScope,
}

impl<R, D, S, N> StateSyncJob<R, D, S, N>
where
    R: Repositories,
    D: DirectoryGateway,
    S: SecretStoreGateway,
    N: NotificationChannel,
{
    pub fn new(
        repos: Arc<R>,
        validator: Arc<StateSyncValidator<R, D, S>>,
        results: Arc<ResultCache<ComprehensiveValidationResult>>,
        channel: Arc<N>,
        scope: TickScope,
    ) -> Self {
        Self {
            repos,
            validator,
            results,
            channel,
            scope,
        }
    }
}

impl<R, D, S, N> ScheduledJob for StateSyncJob<R, D, S, N>
where
    R: Repositories,
    D: DirectoryGateway,
    S: SecretStoreGateway,
    N: NotificationChannel,
{
    fn name(&self) -> &'static str {
        "state_sync_validation"
    }

    async fn run_tick(&self) -> OrgSyncResult<TickSummary> {
        let system = CallerContext::system();
        let mut summary = TickSummary::default();

        for organization_id in organizations_in_scope(self.repos.as_ref(), self.scope).await? {
            match self.validator.validate_all_states(&system, organization_id).await {
                Ok(result) => {
                    let payload = json!({
                        "total_issues": result.total_issues(),
                        "overall_valid": result.overall_valid(),
                        "validated_at": result.validated_at,
                    });
                    self.results.insert(organization_id, result);
                    notify(
                        self.channel.as_ref(),
                        EventEnvelope::new("state_sync.completed", organization_id, payload),
                    )
                    .await;
                    summary.organizations_processed += 1;
                }
                Err(e) => {
                    warn!(organization_id = %organization_id, error = %e, "State-sync validation failed");
                    summary.organizations_failed += 1;
                }
            }
        }
        Ok(summary)
    }
}

/// Runs the comprehensive orphan scan for every organization in scope,
/// optionally applies low-risk repairs, and keeps the latest report.
pub struct OrphanScanJob<R, D, S, N>
where
    R: Repositories,
    D: DirectoryGateway,
    S: SecretStoreGateway,
    N: NotificationChannel,
{
    repos: Arc<R>,
    detector: Arc<OrphanDetector<R, D, S>>,
    cleanup: Arc<CleanupExecutor<R>>,
    reports: Arc<ResultCache<OrphanReport>>,
    channel: Arc<N>,
    scope: TickScope,
    auto_cleanup: bool,
}

impl<R, D, S, N> OrphanScanJob<R, D, S, N>
where
    R: Repositories,
    D: DirectoryGateway,
    S: SecretStoreGateway,
    N: NotificationChannel,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repos: Arc<R>,
        detector: Arc<OrphanDetector<R, D, S>>,
        cleanup: Arc<CleanupExecutor<R>>,
        reports: Arc<ResultCache<OrphanReport>>,
        channel: Arc<N>,
        scope: TickScope,
        auto_cleanup: bool,
    ) -> Self {
        Self {
            repos,
            detector,
            cleanup,
            reports,
            channel,
            scope,
            auto_cleanup,
        }
    }
}

impl<R, D, S, N> ScheduledJob for OrphanScanJob<R, D, S, N>
where
    R: Repositories,
    D: DirectoryGateway,
    S: SecretStoreGateway,
    N: NotificationChannel,
{
    fn name(&self) -> &'static str {
        "orphan_detection"
    }

    async fn run_tick(&self) -> OrgSyncResult<TickSummary> {
        let system = CallerContext::system();
        let mut summary = TickSummary::default();

        for organization_id in organizations_in_scope(self.repos.as_ref(), self.scope).await? {
            let report = match self.detector.run_comprehensive_scan(&system, organization_id).await {
                Ok(report) => report,
                Err(e) => {
                    warn!(organization_id = %organization_id, error = %e, "Orphan scan failed");
                    summary.organizations_failed += 1;
                    continue;
                }
            };

            let mut payload = json!({
                "total_scanned": report.total_scanned(),
                "total_orphans": report.total_orphans(),
                "total_unverified": report.total_unverified(),
            });
            if self.auto_cleanup {
                let recommendations = self.cleanup.recommend(&report);
                match self.cleanup.apply(&system, organization_id, recommendations).await {
                    Ok(cleanup) => {
                        payload["repairs_applied"] = json!(cleanup.applied.len());
                        payload["repairs_pending"] = json!(cleanup.pending_approval.len());
                    }
                    Err(e) => warn!(organization_id = %organization_id, error = %e, "Automatic cleanup failed"),
                }
            }

            self.reports.insert(organization_id, report);
            notify(
                self.channel.as_ref(),
                EventEnvelope::new("orphan_scan.completed", organization_id, payload),
            )
            .await;
            summary.organizations_processed += 1;
        }
        Ok(summary)
    }
}
