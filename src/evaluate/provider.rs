use crate::evaluate::model::EvaluationError;
use crate::evaluate::panel::PanelPoint;
use async_trait::async_trait;
use chrono::NaiveDate;
use log::debug;
use serde::Deserialize;
use std::path::PathBuf;

/// What a worker asks the market-data side for.
#[derive(Clone, Debug)]
pub struct PanelRequest {
    pub factor_code: String,
    pub factor_version: i32,
    pub expression: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub freq: String,
    /// Empty means the provider's default universe.
    pub instruments: Vec<String>,
}

/// Factor values and forward returns over the requested range.
#[derive(Clone, Debug, Default)]
pub struct PanelData {
    pub factor: Vec<PanelPoint>,
    pub label: Vec<PanelPoint>,
}

/// Source of factor/label panels. Expression evaluation and instrument pool
/// expansion both live behind this trait.
#[async_trait]
pub trait DataProvider: Send + Sync {
    async fn fetch(&self, req: &PanelRequest) -> Result<PanelData, EvaluationError>;
}

#[derive(Debug, Deserialize)]
struct PanelFileRow {
    date: NaiveDate,
    instrument: String,
    factor: Option<f64>,
    label: Option<f64>,
}

/// Reads panels exported ahead of time as JSON:
/// `<root>/<code>/v<version>.json`, falling back to `<root>/<code>.json`,
/// each a list of `{date, instrument, factor, label}` rows.
#[derive(Clone, Debug)]
pub struct JsonPanelProvider {
    root: PathBuf,
}

impl JsonPanelProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn candidates(&self, req: &PanelRequest) -> [PathBuf; 2] {
        [
            self.root
                .join(&req.factor_code)
                .join(format!("v{}.json", req.factor_version)),
            self.root.join(format!("{}.json", req.factor_code)),
        ]
    }
}

#[async_trait]
impl DataProvider for JsonPanelProvider {
    async fn fetch(&self, req: &PanelRequest) -> Result<PanelData, EvaluationError> {
        let mut found = None;
        for path in self.candidates(req) {
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                found = Some(path);
                break;
            }
        }
        let path = found.ok_or_else(|| {
            EvaluationError::provider(format!(
                "no panel file for {} v{} under {}",
                req.factor_code,
                req.factor_version,
                self.root.display()
            ))
        })?;

        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| EvaluationError::provider(format!("{}: {}", path.display(), e)))?;
        let rows: Vec<PanelFileRow> = serde_json::from_str(&raw).map_err(|e| {
            EvaluationError::provider(format!("{} is not a panel file: {}", path.display(), e))
        })?;

        let mut data = PanelData::default();
        for row in rows {
            if row.date < req.start || row.date > req.end {
                continue;
            }
            if !req.instruments.is_empty() && !req.instruments.contains(&row.instrument) {
                continue;
            }
            data.factor.push(PanelPoint {
                date: row.date,
                instrument: row.instrument.clone(),
                value: row.factor,
            });
            data.label.push(PanelPoint {
                date: row.date,
                instrument: row.instrument,
                value: row.label,
            });
        }
        debug!(
            "Loaded {} panel rows for {} from {}",
            data.factor.len(),
            req.factor_code,
            path.display()
        );
        Ok(data)
    }
}
