use serde::{Deserialize, Serialize};

/// Errors surfaced by getters and the registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum ApiError {
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("unsupported_resource: {0}")]
    UnsupportedResource(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("source: {0}")]
    Source(String),
    #[error("internal: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Map a data-source failure, keeping not-found distinct.
    pub fn from_source(e: anyhow::Error) -> Self {
        match e.downcast_ref::<kquery_kubehub::NotFound>() {
            Some(nf) => ApiError::NotFound(nf.to_string()),
            None => ApiError::Source(format!("{e:#}")),
        }
    }

    pub fn is_not_found(&self) -> bool { matches!(self, ApiError::NotFound(_)) }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self { ApiError::Internal(e.to_string()) }
}
