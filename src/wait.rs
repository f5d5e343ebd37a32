use std::time::Duration;

use log::{debug, info};
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::error::{CiWaitError, Result};
use crate::output::WaitProgress;
use crate::providers::circleci::{filter_by_name, CircleCiClient, Pipeline, Workflow, WorkflowStatus};

/// Parameters of one wait operation.
#[derive(Debug, Clone)]
pub struct WaitOptions {
    /// Canonical project slug, e.g. `github/org/repo`
    pub project_slug: String,
    /// Commit whose pipeline is awaited
    pub sha: String,
    /// Branch filter for the pipeline search; `None` lists every branch
    pub branch: Option<String>,
    /// Workflows whose name does not match are ignored
    pub workflow_pattern: Regex,
    /// Pause between two polling rounds
    pub interval: Duration,
    /// Draw a spinner on stderr
    pub show_progress: bool,
}

/// States of the wait state machine.
#[derive(Debug)]
pub enum WaitState {
    SearchingPipeline,
    PollingWorkflows { pipeline: Pipeline, round: u32 },
    Succeeded { pipeline: Pipeline, workflows: Vec<Workflow>, rounds: u32 },
    Failed(CiWaitError),
}

/// Aggregate verdict over one round of matched workflows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Success,
    /// First workflow still in a non-terminal status
    Pending { name: String, status: WorkflowStatus },
    /// First workflow that failed or was canceled
    Fatal { name: String, status: WorkflowStatus },
}

/// Classifies a filtered workflow set.
///
/// Any failed or canceled workflow wins over pending ones. An empty set is a
/// success.
pub fn classify(workflows: &[Workflow]) -> Classification {
    if let Some(failed) = workflows.iter().find(|w| w.status.is_failure()) {
        return Classification::Fatal {
            name: failed.name.clone(),
            status: failed.status.clone(),
        };
    }

    match workflows.iter().find(|w| w.status != WorkflowStatus::Success) {
        Some(pending) => Classification::Pending {
            name: pending.name.clone(),
            status: pending.status.clone(),
        },
        None => Classification::Success,
    }
}

/// Outcome of a successful wait.
#[derive(Debug)]
pub struct WaitReport {
    pub pipeline: Pipeline,
    /// Matched workflows of the final round
    pub workflows: Vec<Workflow>,
    /// Number of polling rounds performed
    pub rounds: u32,
}

/// Drives the pipeline search and the workflow polling loop.
pub struct WaitEngine<'c> {
    client: &'c CircleCiClient,
    options: WaitOptions,
    cancel: CancellationToken,
}

impl<'c> WaitEngine<'c> {
    pub fn new(client: &'c CircleCiClient, options: WaitOptions, cancel: CancellationToken) -> Self {
        Self {
            client,
            options,
            cancel,
        }
    }

    /// Runs the state machine until the workflows succeed or the wait fails.
    ///
    /// # Errors
    ///
    /// Returns the error of the `Failed` state: transport and provider
    /// errors, [`CiWaitError::PipelineNotFound`], [`CiWaitError::WorkflowFailed`],
    /// or [`CiWaitError::Cancelled`].
    pub async fn run(self) -> Result<WaitReport> {
        let mut progress = Some(WaitProgress::start_search(
            &self.options.sha,
            self.options.show_progress,
        ));
        let mut state = WaitState::SearchingPipeline;

        loop {
            state = match state {
                WaitState::Succeeded {
                    pipeline,
                    workflows,
                    rounds,
                } => {
                    if let Some(progress) = progress.take() {
                        progress.finish_success();
                    }
                    info!("All workflows are success");
                    return Ok(WaitReport {
                        pipeline,
                        workflows,
                        rounds,
                    });
                }
                WaitState::Failed(err) => {
                    if let Some(progress) = progress.take() {
                        progress.abandon(&err.to_string());
                    }
                    return Err(err);
                }
                WaitState::SearchingPipeline => {
                    let next = self.search().await;
                    if let WaitState::PollingWorkflows { pipeline, .. } = &next {
                        progress = progress.map(|p| p.finish_search_start_polling(pipeline.number));
                    }
                    next
                }
                WaitState::PollingWorkflows { pipeline, round } => {
                    self.poll(pipeline, round, progress.as_ref()).await
                }
            };
        }
    }

    async fn search(&self) -> WaitState {
        match self.find_pipeline().await {
            Ok(pipeline) => {
                info!(
                    "Target pipeline found: number={} id={} sha={} commit={:?}",
                    pipeline.number,
                    pipeline.id,
                    pipeline.revision(),
                    pipeline.vcs.commit.subject
                );
                WaitState::PollingWorkflows { pipeline, round: 1 }
            }
            Err(e) => WaitState::Failed(e),
        }
    }

    /// Scans pipeline pages newest first and stops at the first one built
    /// for the target commit.
    pub async fn find_pipeline(&self) -> Result<Pipeline> {
        let mut iter = self.client.pipelines(&self.options.project_slug);
        if let Some(branch) = &self.options.branch {
            iter = iter.set_branch(branch);
        }

        let mut page = Vec::new();
        while iter.next(&mut page, &self.cancel).await {
            if let Some(pos) = page.iter().position(|p| p.revision() == self.options.sha) {
                return Ok(page.swap_remove(pos));
            }
        }

        match iter.error() {
            Some(e) => Err(e.clone()),
            None => Err(CiWaitError::PipelineNotFound {
                sha: self.options.sha.clone(),
                branch: self.options.branch.clone().unwrap_or_else(|| "*".to_string()),
            }),
        }
    }

    async fn poll(&self, pipeline: Pipeline, round: u32, progress: Option<&WaitProgress>) -> WaitState {
        let workflows = match self.fetch_matched_workflows(&pipeline).await {
            Ok(workflows) => workflows,
            Err(e) => return WaitState::Failed(e),
        };
        debug!("Round {round}: workflows to check {workflows:?}");

        match classify(&workflows) {
            Classification::Success => WaitState::Succeeded {
                pipeline,
                workflows,
                rounds: round,
            },
            Classification::Fatal { name, status } => WaitState::Failed(CiWaitError::WorkflowFailed {
                name,
                status: status.to_string(),
            }),
            Classification::Pending { name, status } => {
                info!("Workflow {name} is still in status {status}");
                if let Some(progress) = progress {
                    progress.update_round(round, &format!("{name} is {status}"));
                }
                match self.pause().await {
                    Ok(()) => WaitState::PollingWorkflows {
                        pipeline,
                        round: round.saturating_add(1),
                    },
                    Err(e) => WaitState::Failed(e),
                }
            }
        }
    }

    /// Fetches the full workflow set of `pipeline` afresh and keeps the ones
    /// whose name matches the pattern.
    async fn fetch_matched_workflows(&self, pipeline: &Pipeline) -> Result<Vec<Workflow>> {
        let mut workflows = Vec::new();
        self.client
            .workflows(&pipeline.id)
            .all(&mut workflows, &self.cancel)
            .await?;
        Ok(filter_by_name(workflows, &self.options.workflow_pattern))
    }

    async fn pause(&self) -> Result<()> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(CiWaitError::Cancelled),
            () = tokio::time::sleep(self.options.interval) => Ok(()),
        }
    }
}
