use serde::{Deserialize, Serialize};

/// Predictive-quality metrics stored on a job once it succeeds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationMetrics {
    #[serde(rename = "IC")]
    pub ic: f64,
    #[serde(rename = "IC_std")]
    pub ic_std: f64,
    #[serde(rename = "ICIR")]
    pub icir: f64,
    #[serde(rename = "RankIC")]
    pub rank_ic: f64,
    #[serde(rename = "RankICIR")]
    pub rank_icir: f64,
    pub annual_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
}

impl EvaluationMetrics {
    /// Replaces non-finite values with 0.0 so the metrics always serialize.
    pub fn sanitized(self) -> Self {
        let f = |v: f64| if v.is_finite() { v } else { 0.0 };
        Self {
            ic: f(self.ic),
            ic_std: f(self.ic_std),
            icir: f(self.icir),
            rank_ic: f(self.rank_ic),
            rank_icir: f(self.rank_icir),
            annual_return: f(self.annual_return),
            sharpe_ratio: f(self.sharpe_ratio),
            max_drawdown: f(self.max_drawdown),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum EvaluationError {
    #[error("data provider failed: {0}")]
    Provider(String),
    #[error("factor or label panel is empty after merge")]
    EmptyPanel,
    #[error("metric computation failed: {0}")]
    Metric(String),
}

impl EvaluationError {
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }
}
