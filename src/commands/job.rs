use super::print_json;
use crate::commands::AppCommand;
use crate::evaluate::EvaluationMetrics;
use crate::platform::FactorPlatform;
use crate::storage::normalize::parse_csv_list;
use crate::storage::repository::{JobRequest, JobStatus};
use anyhow::{bail, Context};
use serde_json::{json, Map, Value};

pub async fn submit(platform: &FactorPlatform, cmd: AppCommand) -> anyhow::Result<()> {
    let AppCommand::SubmitJob {
        code,
        start_date,
        end_date,
        freq,
        instruments,
        priority,
        owner,
        tags,
        callback,
        version,
        context,
    } = cmd
    else {
        bail!("submit called with a different command");
    };

    let context = match context {
        Some(raw) => Some(parse_context(&raw)?),
        None => None,
    };
    let req = JobRequest {
        freq,
        instruments: parse_csv_list(&instruments),
        priority,
        owner,
        tags: tags.as_deref().map(parse_csv_list),
        callback_url: callback,
        context,
        version,
        ..JobRequest::new(code, start_date, end_date)
    };
    print_json(&platform.submit_job(req).await?)
}

fn parse_context(raw: &str) -> anyhow::Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw).context("--context is not valid JSON")? {
        Value::Object(map) => Ok(map),
        _ => bail!("--context must be a JSON object"),
    }
}

pub async fn dequeue(platform: &FactorPlatform, worker: &str, limit: u64) -> anyhow::Result<()> {
    print_json(&platform.dequeue_jobs(worker, limit).await?)
}

pub async fn complete(
    platform: &FactorPlatform,
    job_id: i32,
    metrics: &str,
    result_path: Option<String>,
) -> anyhow::Result<()> {
    let metrics: EvaluationMetrics =
        serde_json::from_str(metrics).context("--metrics is not a valid metrics object")?;
    let status = platform
        .mark_job_succeeded(job_id, metrics, result_path)
        .await?;
    print_json(&json!({ "job_id": job_id, "status": status }))
}

pub async fn fail(platform: &FactorPlatform, job_id: i32, message: &str) -> anyhow::Result<()> {
    let status = platform.mark_job_failed(job_id, message).await?;
    print_json(&json!({ "job_id": job_id, "status": status }))
}

pub async fn attach_result(
    platform: &FactorPlatform,
    job_ids: &[i32],
    path: &str,
) -> anyhow::Result<()> {
    let updated = platform.attach_result_path(job_ids, path).await?;
    print_json(&json!({ "updated": updated, "result_path": path }))
}

pub async fn list(platform: &FactorPlatform, status: Option<&str>, limit: u64) -> anyhow::Result<()> {
    let status = status.map(str::parse::<JobStatus>).transpose()?;
    print_json(&platform.list_jobs(status, limit).await?)
}

pub async fn show(platform: &FactorPlatform, job_id: i32) -> anyhow::Result<()> {
    print_json(&platform.get_job(job_id).await?)
}

pub async fn stats(platform: &FactorPlatform) -> anyhow::Result<()> {
    print_json(&platform.job_stats().await?)
}

pub async fn summary(platform: &FactorPlatform, top: usize) -> anyhow::Result<()> {
    print_json(&platform.summarize_results(top).await?)
}
