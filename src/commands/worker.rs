use super::print_json;
use crate::config::Config;
use crate::evaluate::{FactorWorker, JsonPanelProvider, WorkerService};
use crate::platform::FactorPlatform;
use log::info;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

pub async fn run(
    platform: FactorPlatform,
    config: &Config,
    once: bool,
    workers: Option<usize>,
    panel_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let panel_dir = panel_dir.unwrap_or_else(|| config.panel_dir.clone());
    let provider = Arc::new(JsonPanelProvider::new(panel_dir.clone()));
    let worker = FactorWorker::new(platform, provider);
    let service = WorkerService::new(
        worker,
        workers.unwrap_or(config.workers),
        config.dequeue_batch,
        config.poll_interval,
    );

    if once {
        let resolved = service.run_once("cli-once").await?;
        return print_json(&json!({ "resolved": resolved }));
    }

    info!("starting workers, panels from {}", panel_dir.display());
    let (tx, rx) = watch::channel(false);
    let handles = service.start_workers(rx);
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    let _ = tx.send(true);
    for handle in handles {
        let _ = handle.await;
    }
    Ok(())
}
