pub mod app_command;
mod factor;
mod job;
mod worker;

pub use app_command::{AppCommand, Cli};

use crate::config::Config;
use crate::platform::FactorPlatform;
use serde::Serialize;
use std::time::Duration;

/// Extra time granted to in-flight webhooks on top of their own HTTP timeout.
const CALLBACK_GRACE: Duration = Duration::from_millis(500);

/// Dispatches one parsed command against the configured store, then waits
/// for any webhook it fired before handing control back to `main`.
pub async fn run(command: AppCommand, config: Config) -> anyhow::Result<()> {
    let platform = FactorPlatform::connect(&config).await?;
    let outcome = dispatch(&platform, command, &config).await;
    let abandoned = platform
        .flush_callbacks(config.callback_timeout + CALLBACK_GRACE)
        .await;
    if abandoned > 0 {
        log::warn!("⚠ exiting with {} undelivered callback(s)", abandoned);
    }
    outcome
}

async fn dispatch(
    platform: &FactorPlatform,
    command: AppCommand,
    config: &Config,
) -> anyhow::Result<()> {
    match command {
        AppCommand::InitDb { seed } => factor::init_db(platform, seed.as_deref()).await,
        AppCommand::RegisterFactor {
            code,
            expression,
            name,
            category,
            owner,
            tags,
            description,
            note,
        } => {
            let mut def = crate::storage::repository::FactorDefinition::new(code, expression);
            def.name = name;
            def.category = category;
            def.owner = owner;
            def.tags = tags.as_deref().map(crate::storage::normalize::parse_csv_list);
            def.description = description;
            def.note = note;
            factor::register(platform, def).await
        }
        AppCommand::ListFactors => factor::list(platform).await,
        AppCommand::ShowFactor { code } => factor::show(platform, &code).await,
        AppCommand::DeactivateFactor { code } => factor::set_active(platform, &code, false).await,
        AppCommand::ActivateFactor { code } => factor::set_active(platform, &code, true).await,
        cmd @ AppCommand::SubmitJob { .. } => job::submit(platform, cmd).await,
        AppCommand::Dequeue { limit, worker } => job::dequeue(platform, &worker, limit).await,
        AppCommand::CompleteJob {
            job_id,
            metrics,
            result_path,
        } => job::complete(platform, job_id, &metrics, result_path).await,
        AppCommand::FailJob {
            job_id,
            error_message,
        } => job::fail(platform, job_id, &error_message).await,
        AppCommand::AttachResult { path, job_ids } => {
            job::attach_result(platform, &job_ids, &path).await
        }
        AppCommand::ListJobs { status, limit } => {
            job::list(platform, status.as_deref(), limit).await
        }
        AppCommand::ShowJob { job_id } => job::show(platform, job_id).await,
        AppCommand::Stats => job::stats(platform).await,
        AppCommand::Summary { top } => job::summary(platform, top).await,
        AppCommand::Worker {
            once,
            workers,
            panel_dir,
        } => worker::run(platform.clone(), config, once, workers, panel_dir).await,
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
