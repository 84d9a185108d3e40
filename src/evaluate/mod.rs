pub mod metrics;
pub mod model;
pub mod panel;
pub mod provider;
pub mod service;
pub mod worker;

pub use model::{EvaluationError, EvaluationMetrics};
pub use panel::{MergedPanel, MergedRow, PanelPoint};
pub use provider::{DataProvider, JsonPanelProvider, PanelData, PanelRequest};
pub use service::WorkerService;
pub use worker::FactorWorker;
