//! Error taxonomy shared by the scheduler, analysis pipeline and answer store.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Session, group or point is missing. Callers treat this as a silent no-op.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed input or LLM output (missing topic, non-array points, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Another caller already holds the analysis lease for this group.
    #[error("analysis already in progress")]
    LeaseContention { current_status: Option<String> },

    /// LLM or persistence failure. Logged and retried by the next poll.
    #[error("upstream failure: {0}")]
    Upstream(String),
}

impl CoreError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    pub fn upstream(reason: impl Into<String>) -> Self {
        Self::Upstream(reason.into())
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        Self::Upstream(format!("{err:#}"))
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Upstream(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Upstream(err.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
