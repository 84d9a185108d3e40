use crate::error::{PlatformError, PlatformResult};
use crate::evaluate::model::EvaluationMetrics;
use crate::storage::entity::factor_job::{
    self, ActiveModel as FactorJobActiveModel, Entity as FactorJob, Model as FactorJobModel,
};
use crate::storage::normalize::{
    clamp_priority, non_blank, normalize_list, parse_date, truncate_chars, DEFAULT_PRIORITY,
    MAX_ERROR_CHARS,
};
use crate::storage::now_millis;
use crate::storage::repository::FactorRepository;
use log::{info, warn};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, QueryTrait, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Success,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Success => "SUCCESS",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| PlatformError::invalid(format!("unknown job status '{}'", s.trim())))
    }
}

/// An evaluation request. `version: None` pins the factor's latest version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub factor_code: String,
    pub start_date: String,
    pub end_date: String,
    pub freq: String,
    pub instruments: Vec<String>,
    pub priority: i32,
    pub owner: Option<String>,
    pub tags: Option<Vec<String>>,
    pub callback_url: Option<String>,
    pub context: Option<Map<String, Value>>,
    pub version: Option<i32>,
}

impl JobRequest {
    pub fn new(
        factor_code: impl Into<String>,
        start_date: impl Into<String>,
        end_date: impl Into<String>,
    ) -> Self {
        Self {
            factor_code: factor_code.into(),
            start_date: start_date.into(),
            end_date: end_date.into(),
            freq: "day".to_string(),
            instruments: Vec::new(),
            priority: DEFAULT_PRIORITY,
            owner: None,
            tags: None,
            callback_url: None,
            context: None,
            version: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmittedJob {
    pub job_id: i32,
    pub factor_code: String,
    pub factor_version: i32,
    pub start_date: String,
    pub end_date: String,
    pub freq: String,
}

/// A job handed to exactly one worker by `dequeue_jobs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimedJob {
    pub job_id: i32,
    pub factor_code: String,
    pub factor_version: i32,
    pub expression: String,
    pub start_date: String,
    pub end_date: String,
    pub freq: String,
    pub instruments: Vec<String>,
    pub priority: i32,
    pub owner: Option<String>,
    pub tags: Vec<String>,
    pub callback_url: Option<String>,
    pub name: String,
    pub context: Map<String, Value>,
}

impl From<FactorJobModel> for ClaimedJob {
    fn from(model: FactorJobModel) -> Self {
        let context: Map<String, Value> =
            serde_json::from_str(&model.context_json).unwrap_or_default();
        let name = context
            .get("factor_name")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| model.factor_code.clone());
        Self {
            job_id: model.id,
            factor_code: model.factor_code,
            factor_version: model.factor_version,
            expression: model.expression,
            start_date: model.start_date,
            end_date: model.end_date,
            freq: model.freq,
            instruments: serde_json::from_str(&model.instruments_json).unwrap_or_default(),
            priority: model.priority,
            owner: model.owner,
            tags: serde_json::from_str(&model.tags_json).unwrap_or_default(),
            callback_url: model.callback_url,
            name,
            context,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: i32,
    pub factor_code: String,
    pub factor_version: i32,
    pub status: JobStatus,
    pub start_date: String,
    pub end_date: String,
    pub freq: String,
    pub priority: i32,
    pub owner: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub error_message: Option<String>,
    pub metrics: Option<EvaluationMetrics>,
    pub result_path: Option<String>,
}

impl TryFrom<FactorJobModel> for JobSummary {
    type Error = PlatformError;

    fn try_from(model: FactorJobModel) -> Result<Self, Self::Error> {
        Ok(Self {
            job_id: model.id,
            status: model.status.parse()?,
            metrics: decode_metrics(model.metrics_json.as_deref()),
            factor_code: model.factor_code,
            factor_version: model.factor_version,
            start_date: model.start_date,
            end_date: model.end_date,
            freq: model.freq,
            priority: model.priority,
            owner: model.owner,
            created_at: model.created_at,
            updated_at: model.updated_at,
            error_message: model.error_message,
            result_path: model.result_path,
        })
    }
}

/// Full job record, including the expression snapshot and claim bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDto {
    #[serde(flatten)]
    pub summary: JobSummary,
    pub expression: String,
    pub instruments: Vec<String>,
    pub tags: Vec<String>,
    pub callback_url: Option<String>,
    pub context: Map<String, Value>,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<i64>,
}

impl TryFrom<FactorJobModel> for JobDto {
    type Error = PlatformError;

    fn try_from(model: FactorJobModel) -> Result<Self, Self::Error> {
        let expression = model.expression.clone();
        let instruments = serde_json::from_str(&model.instruments_json).unwrap_or_default();
        let tags = serde_json::from_str(&model.tags_json).unwrap_or_default();
        let callback_url = model.callback_url.clone();
        let context = serde_json::from_str(&model.context_json).unwrap_or_default();
        let claimed_by = model.claimed_by.clone();
        let claimed_at = model.claimed_at;
        Ok(Self {
            summary: JobSummary::try_from(model)?,
            expression,
            instruments,
            tags,
            callback_url,
            context,
            claimed_by,
            claimed_at,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub total: u64,
    pub pending: u64,
    pub running: u64,
    pub success: u64,
    pub failed: u64,
}

/// Result of a terminal transition request.
#[derive(Debug, Clone)]
pub enum Transition {
    /// The row moved into the requested state by this call.
    Applied(FactorJobModel),
    /// The row was already in the requested state; nothing was written.
    Unchanged(FactorJobModel),
}

fn decode_metrics(raw: Option<&str>) -> Option<EvaluationMetrics> {
    raw.and_then(|s| serde_json::from_str(s).ok())
}

const OPEN_STATES: [&str; 2] = ["PENDING", "RUNNING"];

pub struct JobRepository;

impl JobRepository {
    /// Resolves the expression now and stores it on the job as a snapshot.
    pub async fn submit_job(
        db: &DatabaseConnection,
        req: JobRequest,
    ) -> PlatformResult<SubmittedJob> {
        let factor_code = req.factor_code.trim().to_string();
        if factor_code.is_empty() {
            return Err(PlatformError::invalid("factor_code is required"));
        }
        let start = parse_date("start_date", &req.start_date)?;
        let end = parse_date("end_date", &req.end_date)?;
        if start > end {
            return Err(PlatformError::invalid(format!(
                "start_date {} is after end_date {}",
                start, end
            )));
        }
        let freq = req.freq.trim().to_lowercase();
        if freq.is_empty() {
            return Err(PlatformError::invalid("freq is required"));
        }

        // Versions are append-only, so the resolved expression cannot change under us.
        let resolved = FactorRepository::resolve_version(db, &factor_code, req.version).await?;

        let mut context = req.context.unwrap_or_default();
        context
            .entry("factor_name".to_string())
            .or_insert_with(|| Value::String(resolved.factor.name.clone()));
        let tags = match req.tags.map(normalize_list) {
            Some(tags) if !tags.is_empty() => tags,
            _ => resolved.factor.tags.clone(),
        };
        let priority = clamp_priority(req.priority);
        let start_date = start.format("%Y-%m-%d").to_string();
        let end_date = end.format("%Y-%m-%d").to_string();

        let now = now_millis();
        let job = FactorJobActiveModel {
            factor_code: Set(factor_code.clone()),
            factor_version: Set(resolved.version),
            expression: Set(resolved.expression),
            start_date: Set(start_date.clone()),
            end_date: Set(end_date.clone()),
            freq: Set(freq.clone()),
            instruments_json: Set(serde_json::to_string(&normalize_list(req.instruments))?),
            status: Set(JobStatus::Pending.as_str().to_string()),
            priority: Set(priority),
            owner: Set(non_blank(req.owner).or(resolved.factor.owner)),
            tags_json: Set(serde_json::to_string(&tags)?),
            callback_url: Set(non_blank(req.callback_url)),
            context_json: Set(Value::Object(context).to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await?;

        info!(
            "Submitted job [{}] {} v{} {}..{} priority={}",
            job.id, factor_code, resolved.version, start_date, end_date, priority
        );

        Ok(SubmittedJob {
            job_id: job.id,
            factor_code,
            factor_version: resolved.version,
            start_date,
            end_date,
            freq,
        })
    }

    /// Claims up to `limit` PENDING jobs (priority ASC, created_at ASC) and
    /// moves them to RUNNING inside one write transaction.
    ///
    /// The claiming UPDATE is the first statement of the transaction, so SQLite
    /// hands it the database-wide write lock before the candidate rows are
    /// selected; competing claimers (in any process) queue on that lock and
    /// see the rows as RUNNING once they get it. Rows are read back by the
    /// per-call claim token, never by status.
    pub async fn dequeue_jobs(
        db: &DatabaseConnection,
        worker_id: &str,
        limit: u64,
    ) -> PlatformResult<Vec<ClaimedJob>> {
        let limit = limit.max(1);
        let now = now_millis();
        let token = format!("{}-{}-{:08x}", worker_id, now, rand::random::<u32>());

        let candidates = FactorJob::find()
            .select_only()
            .column(factor_job::Column::Id)
            .filter(factor_job::Column::Status.eq(JobStatus::Pending.as_str()))
            .order_by_asc(factor_job::Column::Priority)
            .order_by_asc(factor_job::Column::CreatedAt)
            .order_by_asc(factor_job::Column::Id)
            .limit(limit)
            .into_query();

        let txn = db.begin().await?;
        let claimed = FactorJob::update_many()
            .col_expr(
                factor_job::Column::Status,
                Expr::value(JobStatus::Running.as_str()),
            )
            .col_expr(factor_job::Column::ClaimToken, Expr::value(token.clone()))
            .col_expr(
                factor_job::Column::ClaimedBy,
                Expr::value(worker_id.to_string()),
            )
            .col_expr(factor_job::Column::ClaimedAt, Expr::value(now))
            .col_expr(factor_job::Column::UpdatedAt, Expr::value(now))
            .filter(factor_job::Column::Id.in_subquery(candidates))
            .filter(factor_job::Column::Status.eq(JobStatus::Pending.as_str()))
            .exec(&txn)
            .await?;

        if claimed.rows_affected == 0 {
            txn.commit().await?;
            return Ok(Vec::new());
        }

        let rows = FactorJob::find()
            .filter(factor_job::Column::ClaimToken.eq(token.as_str()))
            .order_by_asc(factor_job::Column::Priority)
            .order_by_asc(factor_job::Column::CreatedAt)
            .order_by_asc(factor_job::Column::Id)
            .all(&txn)
            .await?;
        txn.commit().await?;

        let ids: Vec<i32> = rows.iter().map(|r| r.id).collect();
        info!("[{}] claimed {} job(s): {:?}", worker_id, ids.len(), ids);
        Ok(rows.into_iter().map(ClaimedJob::from).collect())
    }

    /// PENDING/RUNNING -> SUCCESS. Already SUCCESS is left untouched;
    /// FAILED is rejected.
    pub async fn mark_succeeded(
        db: &DatabaseConnection,
        job_id: i32,
        metrics: EvaluationMetrics,
        result_path: Option<String>,
    ) -> PlatformResult<Transition> {
        let metrics_json = serde_json::to_string(&metrics.sanitized())?;
        let now = now_millis();

        let txn = db.begin().await?;
        let mut update = FactorJob::update_many()
            .col_expr(
                factor_job::Column::Status,
                Expr::value(JobStatus::Success.as_str()),
            )
            .col_expr(factor_job::Column::MetricsJson, Expr::value(Some(metrics_json)))
            .col_expr(factor_job::Column::ErrorMessage, Expr::value(None::<String>))
            .col_expr(factor_job::Column::UpdatedAt, Expr::value(now));
        if let Some(path) = non_blank(result_path) {
            update = update.col_expr(factor_job::Column::ResultPath, Expr::value(Some(path)));
        }
        let res = update
            .filter(factor_job::Column::Id.eq(job_id))
            .filter(factor_job::Column::Status.is_in(OPEN_STATES))
            .exec(&txn)
            .await?;
        let job = FactorJob::find_by_id(job_id)
            .one(&txn)
            .await?
            .ok_or_else(|| PlatformError::not_found(format!("job {} not found", job_id)))?;
        txn.commit().await?;

        if res.rows_affected > 0 {
            info!("✓ job [{}] SUCCESS", job_id);
            return Ok(Transition::Applied(job));
        }
        match job.status.parse::<JobStatus>()? {
            JobStatus::Success => {
                info!("job [{}] already SUCCESS, leaving stored metrics as is", job_id);
                Ok(Transition::Unchanged(job))
            }
            from => {
                warn!("refusing to mark job [{}] SUCCESS from {}", job_id, from);
                Err(PlatformError::InvalidTransition {
                    job_id,
                    from,
                    to: JobStatus::Success,
                })
            }
        }
    }

    /// PENDING/RUNNING -> FAILED with a bounded error message. Already FAILED
    /// is left untouched; SUCCESS is rejected.
    pub async fn mark_failed(
        db: &DatabaseConnection,
        job_id: i32,
        error_message: &str,
    ) -> PlatformResult<Transition> {
        let message = truncate_chars(error_message, MAX_ERROR_CHARS);
        let now = now_millis();

        let txn = db.begin().await?;
        let res = FactorJob::update_many()
            .col_expr(
                factor_job::Column::Status,
                Expr::value(JobStatus::Failed.as_str()),
            )
            .col_expr(factor_job::Column::ErrorMessage, Expr::value(Some(message)))
            .col_expr(factor_job::Column::MetricsJson, Expr::value(None::<String>))
            .col_expr(factor_job::Column::UpdatedAt, Expr::value(now))
            .filter(factor_job::Column::Id.eq(job_id))
            .filter(factor_job::Column::Status.is_in(OPEN_STATES))
            .exec(&txn)
            .await?;
        let job = FactorJob::find_by_id(job_id)
            .one(&txn)
            .await?
            .ok_or_else(|| PlatformError::not_found(format!("job {} not found", job_id)))?;
        txn.commit().await?;

        if res.rows_affected > 0 {
            info!("✗ job [{}] FAILED", job_id);
            return Ok(Transition::Applied(job));
        }
        match job.status.parse::<JobStatus>()? {
            JobStatus::Failed => Ok(Transition::Unchanged(job)),
            from => {
                warn!("refusing to mark job [{}] FAILED from {}", job_id, from);
                Err(PlatformError::InvalidTransition {
                    job_id,
                    from,
                    to: JobStatus::Failed,
                })
            }
        }
    }

    /// Sets `result_path` on the given jobs whatever their status.
    pub async fn attach_result_path(
        db: &DatabaseConnection,
        job_ids: &[i32],
        path: &str,
    ) -> PlatformResult<u64> {
        if job_ids.is_empty() {
            return Ok(0);
        }
        let path = path.trim();
        if path.is_empty() {
            return Err(PlatformError::invalid("result path is required"));
        }
        let res = FactorJob::update_many()
            .col_expr(
                factor_job::Column::ResultPath,
                Expr::value(Some(path.to_string())),
            )
            .col_expr(factor_job::Column::UpdatedAt, Expr::value(now_millis()))
            .filter(factor_job::Column::Id.is_in(job_ids.iter().copied()))
            .exec(db)
            .await?;
        info!(
            "Attached result path {} to {} job(s)",
            path, res.rows_affected
        );
        Ok(res.rows_affected)
    }

    /// Newest first, optionally filtered by status.
    pub async fn list_jobs(
        db: &DatabaseConnection,
        status: Option<JobStatus>,
        limit: u64,
    ) -> PlatformResult<Vec<JobSummary>> {
        let mut query = FactorJob::find();
        if let Some(status) = status {
            query = query.filter(factor_job::Column::Status.eq(status.as_str()));
        }
        let models = query
            .order_by_desc(factor_job::Column::CreatedAt)
            .order_by_desc(factor_job::Column::Id)
            .limit(limit)
            .all(db)
            .await?;
        models.into_iter().map(JobSummary::try_from).collect()
    }

    pub async fn get_job(db: &DatabaseConnection, job_id: i32) -> PlatformResult<JobDto> {
        let model = FactorJob::find_by_id(job_id)
            .one(db)
            .await?
            .ok_or_else(|| PlatformError::not_found(format!("job {} not found", job_id)))?;
        JobDto::try_from(model)
    }

    /// SUCCESS jobs ranked by ICIR then IC, best first.
    pub async fn summarize(db: &DatabaseConnection, top: usize) -> PlatformResult<Vec<JobSummary>> {
        let models = FactorJob::find()
            .filter(factor_job::Column::Status.eq(JobStatus::Success.as_str()))
            .all(db)
            .await?;
        let mut jobs = models
            .into_iter()
            .map(JobSummary::try_from)
            .collect::<PlatformResult<Vec<_>>>()?;
        jobs.retain(|j| j.metrics.is_some());
        jobs.sort_by(|a, b| {
            let (ma, mb) = (a.metrics.unwrap_or_default(), b.metrics.unwrap_or_default());
            mb.icir
                .total_cmp(&ma.icir)
                .then_with(|| mb.ic.total_cmp(&ma.ic))
                .then_with(|| a.job_id.cmp(&b.job_id))
        });
        jobs.truncate(top);
        Ok(jobs)
    }

    pub async fn get_stats(db: &DatabaseConnection) -> PlatformResult<JobStats> {
        let rows = FactorJob::find()
            .select_only()
            .column(factor_job::Column::Status)
            .column_as(Expr::col(factor_job::Column::Id).count(), "count")
            .group_by(factor_job::Column::Status)
            .into_tuple::<(String, i64)>()
            .all(db)
            .await?;
        let counts: HashMap<String, u64> =
            rows.into_iter().map(|(s, c)| (s, c as u64)).collect();
        let get = |s: JobStatus| counts.get(s.as_str()).copied().unwrap_or(0);

        Ok(JobStats {
            total: counts.values().sum(),
            pending: get(JobStatus::Pending),
            running: get(JobStatus::Running),
            success: get(JobStatus::Success),
            failed: get(JobStatus::Failed),
        })
    }
}
