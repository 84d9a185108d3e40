use super::print_json;
use crate::platform::FactorPlatform;
use crate::storage::repository::FactorDefinition;
use log::info;
use serde_json::json;
use std::path::Path;

pub async fn init_db(platform: &FactorPlatform, seed: Option<&Path>) -> anyhow::Result<()> {
    let seeded = match seed {
        Some(path) => platform.seed_factors(path).await?,
        None => 0,
    };
    info!("✓ schema ready, {} factor(s) seeded", seeded);
    print_json(&json!({ "ok": true, "seeded": seeded }))
}

pub async fn register(platform: &FactorPlatform, def: FactorDefinition) -> anyhow::Result<()> {
    let registered = platform.register_factor(def).await?;
    print_json(&registered)
}

pub async fn list(platform: &FactorPlatform) -> anyhow::Result<()> {
    print_json(&platform.list_factors().await?)
}

pub async fn show(platform: &FactorPlatform, code: &str) -> anyhow::Result<()> {
    let factor = platform.get_factor(code).await?;
    let versions = platform.factor_versions(code).await?;
    print_json(&json!({ "factor": factor, "versions": versions }))
}

pub async fn set_active(platform: &FactorPlatform, code: &str, active: bool) -> anyhow::Result<()> {
    platform.set_factor_active(code, active).await?;
    print_json(&json!({ "code": code, "active": active }))
}
