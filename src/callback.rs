use crate::evaluate::model::EvaluationMetrics;
use crate::storage::repository::JobStatus;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinSet;

/// Body POSTed to a job's `callback_url` once it succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackPayload {
    pub job_id: i32,
    pub status: JobStatus,
    pub metrics: EvaluationMetrics,
    pub result_path: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum CallbackError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("callback endpoint answered {0}")]
    Status(u16),
}

/// At-most-once webhook delivery. Failures are logged and dropped; the
/// job row is the source of truth.
///
/// Deliveries run on their own tasks, tracked so a short-lived process can
/// [`drain`](Self::drain) them before the runtime goes away.
#[derive(Clone, Debug)]
pub struct CallbackNotifier {
    client: reqwest::Client,
    pending: Arc<Mutex<JoinSet<()>>>,
}

impl CallbackNotifier {
    pub fn new(timeout: Duration) -> Result<Self, CallbackError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            pending: Arc::new(Mutex::new(JoinSet::new())),
        })
    }

    fn pending(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn deliver(&self, url: &str, payload: &CallbackPayload) -> Result<(), CallbackError> {
        let resp = self.client.post(url).json(payload).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CallbackError::Status(status.as_u16()));
        }
        Ok(())
    }

    /// Detaches delivery onto the runtime and returns immediately.
    pub fn fire(&self, url: String, payload: CallbackPayload) {
        let notifier = self.clone();
        let mut pending = self.pending();
        // reap finished deliveries so long-running workers don't accumulate them
        while pending.try_join_next().is_some() {}
        pending.spawn(async move {
            match notifier.deliver(&url, &payload).await {
                Ok(()) => debug!("callback for job [{}] delivered to {}", payload.job_id, url),
                Err(e) => warn!(
                    "⚠ callback for job [{}] to {} failed: {}",
                    payload.job_id, url, e
                ),
            }
        });
    }

    /// Number of deliveries not yet reaped.
    pub fn in_flight(&self) -> usize {
        self.pending().len()
    }

    /// Waits up to `timeout` for outstanding deliveries; whatever is still
    /// running afterwards is aborted. Returns how many were abandoned.
    pub async fn drain(&self, timeout: Duration) -> usize {
        let mut set = std::mem::take(&mut *self.pending());
        if set.is_empty() {
            return 0;
        }
        let waited = tokio::time::timeout(timeout, async {
            while set.join_next().await.is_some() {}
        })
        .await;
        if waited.is_err() {
            let abandoned = set.len();
            warn!("⚠ {} callback(s) still in flight after {:?}, dropping", abandoned, timeout);
            set.abort_all();
            return abandoned;
        }
        0
    }
}
