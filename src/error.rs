//! Error types for the pipeline

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Feed parsing error: {0}")]
    Feed(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Rate limited: retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Degenerate corpus: {documents} documents, {terms} terms for {topics} topics")]
    DegenerateCorpus {
        documents: usize,
        terms: usize,
        topics: usize,
    },

    #[error("Sentiment scorer error: {0}")]
    Scorer(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Run deadline exceeded")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Coarse error category recorded in the run summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimited,
    Transient,
    Connectivity,
    Auth,
    Parse,
    Validation,
    DegenerateCorpus,
    Scorer,
    Timeout,
    Config,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Transient => "transient",
            ErrorKind::Connectivity => "connectivity",
            ErrorKind::Auth => "auth",
            ErrorKind::Parse => "parse",
            ErrorKind::Validation => "validation",
            ErrorKind::DegenerateCorpus => "degenerate_corpus",
            ErrorKind::Scorer => "scorer",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Config => "config",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

impl PipelineError {
    /// Category used for reporting
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::RateLimited { .. } => ErrorKind::RateLimited,
            PipelineError::Api { status, .. } => match *status {
                401 | 403 => ErrorKind::Auth,
                429 => ErrorKind::RateLimited,
                s if s >= 500 => ErrorKind::Transient,
                _ => ErrorKind::Validation,
            },
            PipelineError::Auth(_) => ErrorKind::Auth,
            PipelineError::Network(e) => {
                if e.is_decode() {
                    ErrorKind::Parse
                } else {
                    ErrorKind::Connectivity
                }
            }
            PipelineError::Json(_) | PipelineError::Feed(_) => ErrorKind::Parse,
            PipelineError::Database(e) => match e {
                sqlx::Error::Io(_)
                | sqlx::Error::PoolTimedOut
                | sqlx::Error::PoolClosed
                | sqlx::Error::Tls(_)
                | sqlx::Error::WorkerCrashed => ErrorKind::Connectivity,
                sqlx::Error::Database(_)
                | sqlx::Error::ColumnDecode { .. }
                | sqlx::Error::TypeNotFound { .. } => ErrorKind::Validation,
                _ => ErrorKind::Internal,
            },
            PipelineError::StorageUnavailable(_) => ErrorKind::Connectivity,
            PipelineError::Config(_) => ErrorKind::Config,
            PipelineError::DegenerateCorpus { .. } => ErrorKind::DegenerateCorpus,
            PipelineError::Scorer(_) => ErrorKind::Scorer,
            PipelineError::Validation(_) => ErrorKind::Validation,
            PipelineError::Timeout => ErrorKind::Timeout,
            PipelineError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::RateLimited { .. } => true,
            PipelineError::Api { status, .. } => *status == 429 || *status >= 500,
            PipelineError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    /// Server-provided wait hint, if any
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            PipelineError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}
