use crate::callback::{CallbackNotifier, CallbackPayload};
use crate::config::Config;
use crate::error::PlatformResult;
use crate::evaluate::model::EvaluationMetrics;
use crate::storage;
use crate::storage::repository::{
    ClaimedJob, FactorDefinition, FactorDto, FactorRepository, FactorVersionDto, JobDto,
    JobRepository, JobRequest, JobStats, JobStatus, JobSummary, RegisteredFactor, SubmittedJob,
    Transition,
};
use sea_orm::DatabaseConnection;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Registry and job queue over one shared store.
#[derive(Clone)]
pub struct FactorPlatform {
    db: Arc<DatabaseConnection>,
    notifier: CallbackNotifier,
}

impl FactorPlatform {
    pub fn new(db: Arc<DatabaseConnection>, notifier: CallbackNotifier) -> Self {
        Self { db, notifier }
    }

    pub async fn connect(config: &Config) -> PlatformResult<Self> {
        let db = storage::establish_connection(&config.database_url).await?;
        let notifier = CallbackNotifier::new(config.callback_timeout)?;
        Ok(Self::new(Arc::new(db), notifier))
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    // ---- registry ----

    pub async fn register_factor(&self, def: FactorDefinition) -> PlatformResult<RegisteredFactor> {
        FactorRepository::register_factor(&self.db, def).await
    }

    pub async fn list_factors(&self) -> PlatformResult<Vec<FactorDto>> {
        FactorRepository::list_factors(&self.db).await
    }

    pub async fn get_factor(&self, code: &str) -> PlatformResult<FactorDto> {
        FactorRepository::get_factor(&self.db, code).await
    }

    pub async fn factor_versions(&self, code: &str) -> PlatformResult<Vec<FactorVersionDto>> {
        FactorRepository::versions(&self.db, code).await
    }

    pub async fn resolve_version(&self, code: &str, version: Option<i32>) -> PlatformResult<String> {
        Ok(FactorRepository::resolve_version(&self.db, code, version)
            .await?
            .expression)
    }

    pub async fn set_factor_active(&self, code: &str, active: bool) -> PlatformResult<()> {
        FactorRepository::set_active(&self.db, code, active).await
    }

    pub async fn seed_factors(&self, catalog: &Path) -> PlatformResult<usize> {
        FactorRepository::seed_from_catalog(&self.db, catalog).await
    }

    // ---- queue ----

    pub async fn submit_job(&self, req: JobRequest) -> PlatformResult<SubmittedJob> {
        JobRepository::submit_job(&self.db, req).await
    }

    pub async fn dequeue_jobs(&self, worker_id: &str, limit: u64) -> PlatformResult<Vec<ClaimedJob>> {
        JobRepository::dequeue_jobs(&self.db, worker_id, limit).await
    }

    /// Commits SUCCESS first; the webhook (if any) is fired afterwards on a
    /// detached task and only when this call performed the transition.
    pub async fn mark_job_succeeded(
        &self,
        job_id: i32,
        metrics: EvaluationMetrics,
        result_path: Option<String>,
    ) -> PlatformResult<JobStatus> {
        let transition =
            JobRepository::mark_succeeded(&self.db, job_id, metrics, result_path).await?;
        if let Transition::Applied(job) = &transition {
            if let Some(url) = job.callback_url.clone() {
                let payload = CallbackPayload {
                    job_id,
                    status: JobStatus::Success,
                    metrics: metrics.sanitized(),
                    result_path: job.result_path.clone(),
                };
                self.notifier.fire(url, payload);
            }
        }
        Ok(JobStatus::Success)
    }

    /// Waits for webhook deliveries fired by this process. Returns how many
    /// were abandoned after `timeout`.
    pub async fn flush_callbacks(&self, timeout: Duration) -> usize {
        self.notifier.drain(timeout).await
    }

    pub async fn mark_job_failed(&self, job_id: i32, error_message: &str) -> PlatformResult<JobStatus> {
        JobRepository::mark_failed(&self.db, job_id, error_message).await?;
        Ok(JobStatus::Failed)
    }

    pub async fn attach_result_path(&self, job_ids: &[i32], path: &str) -> PlatformResult<u64> {
        JobRepository::attach_result_path(&self.db, job_ids, path).await
    }

    pub async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: u64,
    ) -> PlatformResult<Vec<JobSummary>> {
        JobRepository::list_jobs(&self.db, status, limit).await
    }

    pub async fn get_job(&self, job_id: i32) -> PlatformResult<JobDto> {
        JobRepository::get_job(&self.db, job_id).await
    }

    pub async fn job_stats(&self) -> PlatformResult<JobStats> {
        JobRepository::get_stats(&self.db).await
    }

    pub async fn summarize_results(&self, top: usize) -> PlatformResult<Vec<JobSummary>> {
        JobRepository::summarize(&self.db, top).await
    }
}
