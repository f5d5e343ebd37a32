use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum CiWaitError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Request to {path} failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: Arc<reqwest::Error>,
    },

    #[error("Failed to decode response of {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: Arc<serde_json::Error>,
    },

    #[error("CircleCI API error on {path} (status {status}): {message}")]
    Provider {
        path: String,
        status: u16,
        message: String,
    },

    #[error("No pipeline found for commit {sha} on branch '{branch}'")]
    PipelineNotFound { sha: String, branch: String },

    #[error("Pipeline has workflow {name} in status {status}")]
    WorkflowFailed { name: String, status: String },

    #[error("Operation cancelled")]
    Cancelled,
}

/// Coarse classification of [`CiWaitError`], independent of its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Transport,
    Provider,
    NotFound,
    WorkflowFailure,
    Cancellation,
}

impl CiWaitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Configuration,
            Self::Transport { .. } | Self::Decode { .. } => ErrorKind::Transport,
            Self::Provider { .. } => ErrorKind::Provider,
            Self::PipelineNotFound { .. } => ErrorKind::NotFound,
            Self::WorkflowFailed { .. } => ErrorKind::WorkflowFailure,
            Self::Cancelled => ErrorKind::Cancellation,
        }
    }
}

pub type Result<T> = std::result::Result<T, CiWaitError>;
