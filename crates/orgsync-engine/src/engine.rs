use std::sync::Arc;

use orgsync_core::error::OrgSyncResult;
use orgsync_core::gateway::{DirectoryGateway, NotificationChannel, SecretStoreGateway};
use orgsync_core::models::context::CallerContext;
use orgsync_core::models::finding::OrphanReport;
use orgsync_core::models::validation::ComprehensiveValidationResult;
use orgsync_core::repository::Repositories;
use uuid::Uuid;

use crate::cache::ResultCache;
use crate::cleanup::CleanupExecutor;
use crate::config::EngineConfig;
use crate::detector::OrphanDetector;
use crate::gateway::{TimedDirectory, TimedSecretStore};
use crate::guard::IsolationGuard;
use crate::reconciler::AssignmentReconciler;
use crate::scheduler::{BackgroundScheduler, OrphanScanJob, StateSyncJob, TickScope};
use crate::validator::StateSyncValidator;

type Dir<D> = TimedDirectory<D>;
type Secrets<S> = TimedSecretStore<S>;

/// All engine components over one set of stores, sharing a single guard and
/// the same timeout-bounded gateways.
pub struct OrgSyncEngine<R, D, S, N>
where
    R: Repositories,
    D: DirectoryGateway,
    S: SecretStoreGateway,
    N: NotificationChannel,
{
    config: EngineConfig,
    guard: Arc<IsolationGuard>,
    reconciler: AssignmentReconciler<R, Dir<D>>,
    detector: Arc<OrphanDetector<R, Dir<D>, Secrets<S>>>,
    validator: Arc<StateSyncValidator<R, Dir<D>, Secrets<S>>>,
    cleanup: Arc<CleanupExecutor<R>>,
    validation_results: Arc<ResultCache<ComprehensiveValidationResult>>,
    orphan_reports: Arc<ResultCache<OrphanReport>>,
    sync_schedule: BackgroundScheduler<StateSyncJob<R, Dir<D>, Secrets<S>, N>>,
    orphan_schedule: BackgroundScheduler<OrphanScanJob<R, Dir<D>, Secrets<S>, N>>,
}

impl<R, D, S, N> OrgSyncEngine<R, D, S, N>
where
    R: Repositories,
    D: DirectoryGateway,
    S: SecretStoreGateway,
    N: NotificationChannel,
{
    pub fn new(repos: R, directory: D, secrets: S, channel: N, config: EngineConfig) -> Self {
        let repos = Arc::new(repos);
        let directory = Arc::new(TimedDirectory::new(directory, config.external_call_timeout()));
        let secrets = Arc::new(TimedSecretStore::new(secrets, config.external_call_timeout()));
        let channel = Arc::new(channel);
        let guard = Arc::new(IsolationGuard::new(config.credential_secret_markers.clone()));
        let fan_out = config.fan_out();

        let reconciler =
            AssignmentReconciler::new(Arc::clone(&repos), Arc::clone(&directory), Arc::clone(&guard), fan_out);
        let detector = Arc::new(OrphanDetector::new(
            Arc::clone(&repos),
            Arc::clone(&directory),
            Arc::clone(&secrets),
            Arc::clone(&guard),
            fan_out,
        ));
        let validator = Arc::new(StateSyncValidator::new(
            Arc::clone(&repos),
            Arc::clone(&directory),
            Arc::clone(&secrets),
            Arc::clone(&detector),
            Arc::clone(&guard),
            fan_out,
        ));
        let cleanup = Arc::new(CleanupExecutor::new(Arc::clone(&repos), Arc::clone(&guard)));

        let validation_results = Arc::new(ResultCache::new(config.result_ttl(), config.result_cache_capacity));
        let orphan_reports = Arc::new(ResultCache::new(config.result_ttl(), config.result_cache_capacity));

        let sync_schedule = BackgroundScheduler::new(
            Arc::new(StateSyncJob::new(
                Arc::clone(&repos),
                Arc::clone(&validator),
                Arc::clone(&validation_results),
                Arc::clone(&channel),
                TickScope::AllActiveOrganizations,
            )),
            config.sync_validation_interval(),
        );
        let orphan_schedule = BackgroundScheduler::new(
            Arc::new(OrphanScanJob::new(
                Arc::clone(&repos),
                Arc::clone(&detector),
                Arc::clone(&cleanup),
                Arc::clone(&orphan_reports),
                channel,
                TickScope::AllActiveOrganizations,
                config.auto_cleanup,
            )),
            config.orphan_detection_interval(),
        );

        Self {
            config,
            guard,
            reconciler,
            detector,
            validator,
            cleanup,
            validation_results,
            orphan_reports,
            sync_schedule,
            orphan_schedule,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn guard(&self) -> &IsolationGuard {
        &self.guard
    }

    pub fn reconciler(&self) -> &AssignmentReconciler<R, Dir<D>> {
        &self.reconciler
    }

    pub fn detector(&self) -> &OrphanDetector<R, Dir<D>, Secrets<S>> {
        &self.detector
    }

    pub fn validator(&self) -> &StateSyncValidator<R, Dir<D>, Secrets<S>> {
        &self.validator
    }

    pub fn cleanup(&self) -> &CleanupExecutor<R> {
        &self.cleanup
    }

    /// Start the periodic state-sync validation. `false` if already running.
    pub fn start_background_validation(&self) -> bool {
        self.sync_schedule.start()
    }

    pub async fn stop_background_validation(&self) -> bool {
        self.sync_schedule.stop().await
    }

    /// Start the periodic orphan scan. `false` if already running.
    pub fn start_orphan_detection(&self) -> bool {
        self.orphan_schedule.start()
    }

    pub async fn stop_orphan_detection(&self) -> bool {
        self.orphan_schedule.stop().await
    }

    pub fn sync_schedule(&self) -> &BackgroundScheduler<StateSyncJob<R, Dir<D>, Secrets<S>, N>> {
        &self.sync_schedule
    }

    pub fn orphan_schedule(&self) -> &BackgroundScheduler<OrphanScanJob<R, Dir<D>, Secrets<S>, N>> {
        &self.orphan_schedule
    }

    /// Latest cached validation of the organization; `Ok(None)` before the
    /// first tick has completed or after the result expired.
    pub fn get_latest_validation_result(
        &self,
        caller: &CallerContext,
        organization_id: Uuid,
    ) -> OrgSyncResult<Option<Arc<ComprehensiveValidationResult>>> {
        self.guard
            .validate_organization_access(caller, organization_id, "read_validation_result")?;
        Ok(self.validation_results.get(organization_id))
    }

    pub fn get_latest_orphan_report(
        &self,
        caller: &CallerContext,
        organization_id: Uuid,
    ) -> OrgSyncResult<Option<Arc<OrphanReport>>> {
        self.guard
            .validate_organization_access(caller, organization_id, "read_orphan_report")?;
        Ok(self.orphan_reports.get(organization_id))
    }
}
