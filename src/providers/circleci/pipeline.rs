use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::client::CircleCiClient;
use super::pagination::ListIterator;
use crate::error::{CiWaitError, Result};

/// Error attached to a pipeline, e.g. a config compilation failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineError {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerActor {
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// What started the pipeline (webhook, API call, schedule).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineTrigger {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actor: TriggerActor,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
}

/// Version control metadata of a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineVcs {
    #[serde(default)]
    pub origin_repository_url: String,
    #[serde(default)]
    pub target_repository_url: String,
    /// Commit SHA the pipeline was built for
    #[serde(default)]
    pub revision: String,
    #[serde(default)]
    pub provider_name: String,
    #[serde(default)]
    pub commit: Commit,
    #[serde(default)]
    pub branch: Option<String>,
}

/// A CircleCI pipeline as returned by the v2 API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub number: u64,
    pub id: String,
    #[serde(default)]
    pub project_slug: String,
    /// Pipeline state (e.g., "created", "errored", "setup-pending")
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub errors: Vec<PipelineError>,
    #[serde(default)]
    pub vcs: PipelineVcs,
    #[serde(default)]
    pub trigger: PipelineTrigger,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Pipeline {
    pub fn revision(&self) -> &str {
        &self.vcs.revision
    }
}

/// Iterator over the pipelines of one project, newest first.
pub struct PipelineListIter<'c> {
    inner: ListIterator<'c, Pipeline>,
    project_slug: String,
}

impl<'c> PipelineListIter<'c> {
    /// Restricts the listing to `branch`. Only takes effect before the first fetch.
    #[must_use]
    pub fn set_branch(mut self, branch: &str) -> Self {
        self.inner.set_initial_param("branch", branch);
        self
    }

    pub fn project_slug(&self) -> &str {
        &self.project_slug
    }

    pub fn error(&self) -> Option<&CiWaitError> {
        self.inner.error()
    }

    pub async fn next(&mut self, out: &mut Vec<Pipeline>, cancel: &CancellationToken) -> bool {
        self.inner.next(out, cancel).await
    }

    pub async fn all(&mut self, out: &mut Vec<Pipeline>, cancel: &CancellationToken) -> Result<()> {
        self.inner.all(out, cancel).await
    }
}

impl CircleCiClient {
    pub fn pipelines(&self, project_slug: &str) -> PipelineListIter<'_> {
        PipelineListIter {
            inner: ListIterator::new(self, format!("project/{project_slug}/pipeline")),
            project_slug: project_slug.to_string(),
        }
    }

    /// Fetches a single pipeline by its per-project number.
    pub async fn get_pipeline(
        &self,
        project_slug: &str,
        number: u64,
        cancel: &CancellationToken,
    ) -> Result<Pipeline> {
        self.get_json(&format!("project/{project_slug}/pipeline/{number}"), &[], cancel)
            .await
    }
}
