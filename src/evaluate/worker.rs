use crate::error::PlatformResult;
use crate::evaluate::metrics;
use crate::evaluate::model::{EvaluationError, EvaluationMetrics};
use crate::evaluate::panel::MergedPanel;
use crate::evaluate::provider::{DataProvider, PanelRequest};
use crate::platform::FactorPlatform;
use crate::storage::repository::{ClaimedJob, JobStatus};
use chrono::NaiveDate;
use log::{info, warn};
use std::sync::Arc;

/// Evaluates claimed jobs and writes the outcome back to the queue.
#[derive(Clone)]
pub struct FactorWorker {
    platform: FactorPlatform,
    provider: Arc<dyn DataProvider>,
}

impl FactorWorker {
    pub fn new(platform: FactorPlatform, provider: Arc<dyn DataProvider>) -> Self {
        Self { platform, provider }
    }

    pub fn platform(&self) -> &FactorPlatform {
        &self.platform
    }

    /// Provider fetch, merge, metrics. Never touches the queue.
    pub async fn evaluate(&self, job: &ClaimedJob) -> Result<EvaluationMetrics, EvaluationError> {
        let req = PanelRequest {
            factor_code: job.factor_code.clone(),
            factor_version: job.factor_version,
            expression: job.expression.clone(),
            start: parse_job_date(&job.start_date)?,
            end: parse_job_date(&job.end_date)?,
            freq: job.freq.clone(),
            instruments: job.instruments.clone(),
        };
        if req.freq != "day" {
            warn!(
                "job [{}] freq={} but annualized metrics assume daily bars",
                job.job_id, req.freq
            );
        }

        let data = self.provider.fetch(&req).await?;
        let panel = MergedPanel::merge(&data.factor, &data.label);
        if panel.is_empty() {
            return Err(EvaluationError::EmptyPanel);
        }
        let rows = panel.len();

        let computed = tokio::task::spawn_blocking(move || metrics::evaluate(&panel))
            .await
            .map_err(|e| EvaluationError::Metric(e.to_string()))?;
        info!(
            "job [{}] {} v{}: {} rows, IC={:.4} ICIR={:.4}",
            job.job_id, job.factor_code, job.factor_version, rows, computed.ic, computed.icir
        );
        Ok(computed)
    }

    /// Evaluates one job and resolves it to SUCCESS or FAILED.
    pub async fn process(&self, job: ClaimedJob) -> PlatformResult<JobStatus> {
        match self.evaluate(&job).await {
            Ok(m) => self.platform.mark_job_succeeded(job.job_id, m, None).await,
            Err(err) => {
                warn!("✗ job [{}] evaluation failed: {}", job.job_id, err);
                self.platform
                    .mark_job_failed(job.job_id, &err.to_string())
                    .await
            }
        }
    }
}

fn parse_job_date(raw: &str) -> Result<NaiveDate, EvaluationError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| EvaluationError::provider(format!("bad job date '{}': {}", raw, e)))
}
