#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use factorq::callback::CallbackNotifier;
use factorq::evaluate::{DataProvider, EvaluationError, PanelData, PanelPoint, PanelRequest};
use factorq::storage::establish_connection;
use factorq::storage::repository::{FactorDefinition, JobRequest};
use factorq::FactorPlatform;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// A platform over a fresh SQLite file. Keep the `TempDir` alive for the test.
pub async fn temp_platform() -> (FactorPlatform, TempDir) {
    let dir = TempDir::new().unwrap();
    let url = db_url(&dir);
    let db = establish_connection(&url).await.unwrap();
    let notifier = CallbackNotifier::new(Duration::from_secs(2)).unwrap();
    (FactorPlatform::new(Arc::new(db), notifier), dir)
}

pub fn db_url(dir: &TempDir) -> String {
    format!("sqlite://{}?mode=rwc", dir.path().join("factors.db").display())
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub async fn register(platform: &FactorPlatform, code: &str, expression: &str) {
    platform
        .register_factor(FactorDefinition::new(code, expression))
        .await
        .unwrap();
}

pub async fn submit(platform: &FactorPlatform, code: &str, priority: i32) -> i32 {
    let req = JobRequest {
        priority,
        ..JobRequest::new(code, "2024-01-01", "2024-03-31")
    };
    platform.submit_job(req).await.unwrap().job_id
}

/// Panel where the label is a fixed linear function of the factor plus a
/// per-date shift, so IC is exactly 1 on every date.
pub fn linear_panel(days: u32, instruments: &[&str]) -> PanelData {
    let mut data = PanelData::default();
    for d in 0..days {
        let day = date(2024, 1, 2) + chrono::Duration::days(d as i64);
        for (i, inst) in instruments.iter().enumerate() {
            let f = (i as f64 + 1.0) * (1.0 + d as f64 * 0.1);
            data.factor.push(PanelPoint::new(day, *inst, f));
            data.label.push(PanelPoint::new(day, *inst, 0.001 * f - 0.0005 * d as f64));
        }
    }
    data
}

/// Provider returning canned panels or a canned error, recording requests.
pub struct MockProvider {
    pub panel: Option<PanelData>,
    pub error: Option<String>,
    pub requests: Mutex<Vec<PanelRequest>>,
}

impl MockProvider {
    pub fn with_panel(panel: PanelData) -> Self {
        Self {
            panel: Some(panel),
            error: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_error(reason: &str) -> Self {
        Self {
            panel: None,
            error: Some(reason.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl DataProvider for MockProvider {
    async fn fetch(&self, req: &PanelRequest) -> Result<PanelData, EvaluationError> {
        self.requests.lock().unwrap().push(req.clone());
        if let Some(reason) = &self.error {
            return Err(EvaluationError::provider(reason.clone()));
        }
        Ok(self.panel.clone().unwrap_or_default())
    }
}
