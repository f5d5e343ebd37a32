use std::fmt;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::client::CircleCiClient;
use super::pagination::ListIterator;
use crate::error::{CiWaitError, Result};

/// Workflow status as reported by CircleCI.
///
/// Unknown values are kept verbatim and treated as still in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WorkflowStatus {
    Running,
    Success,
    Failed,
    Canceled,
    OnHold,
    Other(String),
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::OnHold => "on_hold",
            Self::Other(s) => s,
        }
    }

    /// `failed` and `canceled` end the wait.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Canceled)
    }

    pub fn is_terminal(&self) -> bool {
        self.is_failure() || *self == Self::Success
    }
}

impl From<String> for WorkflowStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "running" => Self::Running,
            "success" => Self::Success,
            "failed" => Self::Failed,
            "canceled" => Self::Canceled,
            "on_hold" => Self::OnHold,
            _ => Self::Other(value),
        }
    }
}

impl From<WorkflowStatus> for String {
    fn from(value: WorkflowStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A workflow inside a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    pub status: WorkflowStatus,
    #[serde(default)]
    pub pipeline_id: String,
    #[serde(default)]
    pub pipeline_number: u64,
    #[serde(default)]
    pub project_slug: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stopped_at: Option<DateTime<Utc>>,
}

/// Keeps the workflows for which `keep` returns true, preserving order.
pub fn filter_by<F>(workflows: Vec<Workflow>, keep: F) -> Vec<Workflow>
where
    F: Fn(&Workflow) -> bool,
{
    workflows.into_iter().filter(|w| keep(w)).collect()
}

/// Keeps the workflows whose name matches `pattern` (unanchored search).
pub fn filter_by_name(workflows: Vec<Workflow>, pattern: &Regex) -> Vec<Workflow> {
    filter_by(workflows, |w| pattern.is_match(&w.name))
}

/// Iterator over the workflows of one pipeline.
pub struct WorkflowListIter<'c> {
    inner: ListIterator<'c, Workflow>,
    pipeline_id: String,
}

impl<'c> WorkflowListIter<'c> {
    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    pub fn error(&self) -> Option<&CiWaitError> {
        self.inner.error()
    }

    pub async fn next(&mut self, out: &mut Vec<Workflow>, cancel: &CancellationToken) -> bool {
        self.inner.next(out, cancel).await
    }

    pub async fn all(&mut self, out: &mut Vec<Workflow>, cancel: &CancellationToken) -> Result<()> {
        self.inner.all(out, cancel).await
    }
}

impl CircleCiClient {
    pub fn workflows(&self, pipeline_id: &str) -> WorkflowListIter<'_> {
        WorkflowListIter {
            inner: ListIterator::new(self, format!("pipeline/{pipeline_id}/workflow")),
            pipeline_id: pipeline_id.to_string(),
        }
    }
}
