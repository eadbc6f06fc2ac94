use thiserror::Error;

/// Errors raised by the analytics core.
///
/// The adapter layer returns these as-is. Read operations of
/// [`AnalyticsService`](crate::services::analytics::AnalyticsService) swallow
/// them and answer with zeroed stats; only `InvalidCacheType` is a programmer
/// error and is never converted.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("User not authenticated")]
    NotAuthenticated,

    #[error("Question not found: {0}")]
    QuestionNotFound(String),

    #[error("Invalid cache type: {0}")]
    InvalidCacheType(String),

    #[error("Failed to read {operation}: {message}")]
    RemoteRead { operation: String, message: String },

    #[error("Failed to write {operation}: {message}")]
    RemoteWrite { operation: String, message: String },

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AnalyticsError {
    pub fn read(operation: impl Into<String>, err: impl std::fmt::Display) -> Self {
        AnalyticsError::RemoteRead {
            operation: operation.into(),
            message: err.to_string(),
        }
    }

    pub fn write(operation: impl Into<String>, err: impl std::fmt::Display) -> Self {
        AnalyticsError::RemoteWrite {
            operation: operation.into(),
            message: err.to_string(),
        }
    }
}

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;
