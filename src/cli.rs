use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::ErrorKind;
use crate::output;
use crate::plugin::{ActionOutcome, Plugin, PluginConfig};

#[derive(Parser, Debug)]
#[command(name = "ciwait")]
#[command(author, version, about = "Wait for CircleCI workflows of a commit", long_about = None)]
pub struct Cli {
    /// Repository to take action on (URL or slug)
    #[arg(long, env = "PLUGIN_REPO")]
    repo: Option<String>,

    #[arg(long, env = "DRONE_REPO_LINK", hide = true)]
    drone_repo_link: Option<String>,

    /// CircleCI API token
    #[arg(long, env = "PLUGIN_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Action to dispatch
    #[arg(long, env = "PLUGIN_ACTION", default_value = "wait")]
    action: String,

    /// Commit SHA to wait for
    #[arg(long, env = "PLUGIN_WAIT_SHA")]
    wait_sha: Option<String>,

    #[arg(long, env = "DRONE_COMMIT_SHA", hide = true)]
    drone_commit_sha: Option<String>,

    /// Branch of the commit to wait for
    #[arg(long, env = "PLUGIN_WAIT_BRANCH")]
    wait_branch: Option<String>,

    #[arg(long, env = "DRONE_SOURCE_BRANCH", hide = true)]
    drone_source_branch: Option<String>,

    /// Workflows to wait for, as a regular expression
    #[arg(long, env = "PLUGIN_WAIT_WORKFLOW")]
    wait_workflow: Option<String>,

    /// Interval between status checks, in seconds
    #[arg(long, env = "PLUGIN_WAIT_INTERVAL")]
    wait_interval: Option<u64>,

    /// Delay before the first pipeline lookup, in seconds
    #[arg(long, env = "PLUGIN_STARTUP_DELAY")]
    startup_delay: Option<u64>,

    /// CircleCI API endpoint, without the version segment
    #[arg(long, env = "PLUGIN_BASE_URL")]
    base_url: Option<String>,

    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Disable the progress spinner
    #[arg(long, default_value_t = false)]
    no_progress: bool,
}

impl Cli {
    /// Merges command line, environment and config file; flags win over the file.
    fn plugin_config(&self, file: Config) -> PluginConfig {
        PluginConfig {
            repo: self
                .repo
                .clone()
                .or_else(|| self.drone_repo_link.clone())
                .or(file.circleci.repo)
                .unwrap_or_default(),
            api_token: self
                .api_token
                .clone()
                .or(file.circleci.token)
                .unwrap_or_default(),
            action: self.action.clone(),
            base_url: self.base_url.clone().unwrap_or(file.circleci.base_url),
            sha: self
                .wait_sha
                .clone()
                .or_else(|| self.drone_commit_sha.clone())
                .unwrap_or_default(),
            branch: self
                .wait_branch
                .clone()
                .or_else(|| self.drone_source_branch.clone())
                .or(file.wait.branch),
            workflow: self.wait_workflow.clone().unwrap_or(file.wait.workflow),
            interval: Duration::from_secs(self.wait_interval.unwrap_or(file.wait.interval)),
            startup_delay: Duration::from_secs(
                self.startup_delay.unwrap_or(file.wait.startup_delay),
            ),
            show_progress: !self.no_progress,
        }
    }

    pub async fn execute(&self) -> Result<()> {
        let file = Config::load(self.config.as_deref())?;
        let config = self.plugin_config(file);
        let action = config.action.clone();

        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping the wait");
                on_interrupt.cancel();
            }
        });

        let result = Plugin::new(config).exec(cancel).await;
        if let Err(e) = &result {
            if e.kind() == ErrorKind::Cancellation {
                warn!("Action {action} was aborted before completion");
            }
        }
        let outcome = result.with_context(|| format!("failed to execute action {action}"))?;

        match outcome {
            ActionOutcome::Waited(report) => {
                output::print_summary(&report.pipeline, &report.workflows);
                info!(
                    "Pipeline #{} succeeded after {} round(s)",
                    report.pipeline.number, report.rounds
                );
            }
        }

        Ok(())
    }
}
