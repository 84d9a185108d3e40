use crate::storage::repository::JobStatus;

/// Errors surfaced synchronously by registry and queue operations.
#[derive(thiserror::Error, Debug)]
pub enum PlatformError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: i32,
        from: JobStatus,
        to: JobStatus,
    },
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("callback client: {0}")]
    Callback(#[from] crate::callback::CallbackError),
}

impl PlatformError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

pub type PlatformResult<T> = Result<T, PlatformError>;
