use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use log::{debug, info};
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::auth::Token;
use crate::error::{CiWaitError, Result};
use crate::providers::circleci::{ApiVersion, CircleCiClient, API_ENDPOINT};
use crate::wait::{WaitEngine, WaitOptions, WaitReport};

/// Action the plugin dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Wait for the workflows of a commit's pipeline to succeed.
    Wait,
    /// Trigger a new pipeline. Not supported yet.
    Trigger,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wait => "wait",
            Self::Trigger => "trigger",
        }
    }
}

impl FromStr for Action {
    type Err = CiWaitError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "wait" => Ok(Self::Wait),
            "trigger" => Ok(Self::Trigger),
            other => Err(CiWaitError::Config(format!("unknown action '{other}'"))),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical `<vcs>/<org>/<repo>` project slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSlug(String);

fn repo_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^https?://(github|bitbucket)[^/]*/([^/]+)/([^/]+?)(?:\.git)?/?$")
            .expect("repo url pattern is valid")
    })
}

fn repo_slug_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(github|gh|bitbucket|bb)/([^/]+)/([^/]+)$").expect("repo slug pattern is valid")
    })
}

impl RepoSlug {
    /// Normalizes a GitHub/Bitbucket repository URL or slug.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for any other shape.
    pub fn parse(repo: &str) -> Result<Self> {
        let repo = repo.trim();
        let captures = repo_url_regex()
            .captures(repo)
            .or_else(|| repo_slug_regex().captures(repo))
            .ok_or_else(|| {
                CiWaitError::Config(format!("format of repo '{repo}' is not supported yet"))
            })?;

        let vcs = match &captures[1] {
            "gh" => "github",
            "bb" => "bitbucket",
            other => other,
        };
        Ok(Self(format!("{vcs}/{}/{}", &captures[2], &captures[3])))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw plugin settings, before validation.
#[derive(Debug, Clone)]
pub struct PluginConfig {
    pub repo: String,
    pub api_token: String,
    pub action: String,
    pub base_url: String,
    pub sha: String,
    pub branch: Option<String>,
    pub workflow: String,
    pub interval: Duration,
    pub startup_delay: Duration,
    pub show_progress: bool,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            repo: String::new(),
            api_token: String::new(),
            action: Action::Wait.as_str().to_string(),
            base_url: API_ENDPOINT.to_string(),
            sha: String::new(),
            branch: None,
            workflow: crate::config::default_workflow(),
            interval: Duration::from_secs(crate::config::default_interval()),
            startup_delay: Duration::from_secs(crate::config::default_startup_delay()),
            show_progress: false,
        }
    }
}

/// A validated action, ready to run.
#[derive(Debug)]
pub enum PreparedAction {
    Wait(WaitOptions),
}

impl PreparedAction {
    /// Validates `config` for its action without touching the network.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unknown or unsupported action, an
    /// unsupported repo shape, an empty commit SHA, or an invalid workflow
    /// pattern.
    pub fn from_config(config: &PluginConfig) -> Result<Self> {
        match config.action.parse::<Action>()? {
            Action::Wait => {
                let slug = RepoSlug::parse(&config.repo)?;
                let sha = config.sha.trim();
                if sha.is_empty() {
                    return Err(CiWaitError::Config("commit sha to wait has to be set".into()));
                }
                let workflow_pattern = Regex::new(&config.workflow).map_err(|e| {
                    CiWaitError::Config(format!(
                        "failed to compile workflow name regexp {}: {e}",
                        config.workflow
                    ))
                })?;

                Ok(Self::Wait(WaitOptions {
                    project_slug: slug.to_string(),
                    sha: sha.to_string(),
                    branch: config.branch.clone().filter(|b| !b.is_empty()),
                    workflow_pattern,
                    interval: config.interval,
                    show_progress: config.show_progress,
                }))
            }
            action @ Action::Trigger => Err(CiWaitError::Config(format!(
                "action {action} is not supported yet"
            ))),
        }
    }

    pub fn action(&self) -> Action {
        match self {
            Self::Wait(_) => Action::Wait,
        }
    }
}

/// Result of a dispatched action.
#[derive(Debug)]
pub enum ActionOutcome {
    Waited(WaitReport),
}

/// The CI plugin: validates its settings, authenticates, then dispatches.
pub struct Plugin {
    config: PluginConfig,
}

impl Plugin {
    pub fn new(config: PluginConfig) -> Self {
        Self { config }
    }

    /// Runs the configured action.
    ///
    /// # Errors
    ///
    /// Configuration errors are reported before any request is sent. Every
    /// other failure of the action is returned unchanged.
    pub async fn exec(&self, cancel: CancellationToken) -> Result<ActionOutcome> {
        debug!("Plugin got config {:?}", self.redacted());

        let prepared = PreparedAction::from_config(&self.config)?;
        let token = Token::new(&self.config.api_token)?;
        let client = CircleCiClient::new(&self.config.base_url, ApiVersion::default(), &token)?;
        client.authenticate(&cancel).await?;

        if !self.config.startup_delay.is_zero() {
            info!(
                "Waiting {}s before looking up pipelines",
                self.config.startup_delay.as_secs()
            );
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(CiWaitError::Cancelled),
                () = tokio::time::sleep(self.config.startup_delay) => {}
            }
        }

        match prepared {
            PreparedAction::Wait(options) => {
                let report = WaitEngine::new(&client, options, cancel).run().await?;
                Ok(ActionOutcome::Waited(report))
            }
        }
    }

    fn redacted(&self) -> PluginConfig {
        let mut config = self.config.clone();
        if !config.api_token.is_empty() {
            config.api_token = "***".to_string();
        }
        config
    }
}

/// Waits for the workflows of `sha` in `repo` to succeed.
///
/// Convenience wrapper around [`Plugin`] using the public CircleCI endpoint.
/// Like the plugin, it pauses for the default startup delay after
/// authenticating so a freshly pushed pipeline has time to show up.
pub async fn wait(
    repo: &str,
    sha: &str,
    branch: Option<&str>,
    workflow_pattern: &str,
    interval: Duration,
    api_token: &str,
    cancel: CancellationToken,
) -> Result<WaitReport> {
    let config = wait_config(repo, sha, branch, workflow_pattern, interval, api_token);
    match Plugin::new(config).exec(cancel).await? {
        ActionOutcome::Waited(report) => Ok(report),
    }
}

fn wait_config(
    repo: &str,
    sha: &str,
    branch: Option<&str>,
    workflow_pattern: &str,
    interval: Duration,
    api_token: &str,
) -> PluginConfig {
    PluginConfig {
        repo: repo.to_string(),
        api_token: api_token.to_string(),
        sha: sha.to_string(),
        branch: branch.map(ToString::to_string),
        workflow: workflow_pattern.to_string(),
        interval,
        ..PluginConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use mockito::Matcher;

    fn config_for(server: &mockito::ServerGuard) -> PluginConfig {
        PluginConfig {
            repo: "https://github.com/org/repo".to_string(),
            api_token: "t0ken".to_string(),
            base_url: server.url(),
            sha: "abc".to_string(),
            branch: Some("main".to_string()),
            interval: Duration::from_millis(10),
            startup_delay: Duration::ZERO,
            ..PluginConfig::default()
        }
    }

    mod repo_slug_tests {
        use super::*;

        #[test]
        fn test_github_url() {
            let slug = RepoSlug::parse("https://github.com/han0110/drone-circleci").unwrap();
            assert_eq!(slug.as_str(), "github/han0110/drone-circleci");
        }

        #[test]
        fn test_bitbucket_url_with_git_suffix() {
            let slug = RepoSlug::parse("https://bitbucket.org/team/service.git").unwrap();
            assert_eq!(slug.as_str(), "bitbucket/team/service");
        }

        #[test]
        fn test_short_slug_is_expanded() {
            assert_eq!(RepoSlug::parse("gh/org/repo").unwrap().as_str(), "github/org/repo");
            assert_eq!(RepoSlug::parse("bb/org/repo").unwrap().as_str(), "bitbucket/org/repo");
        }

        #[test]
        fn test_unsupported_shapes_are_config_errors() {
            for repo in ["https://gitlab.com/org/repo", "org/repo", "", "https://github.com/org"] {
                let err = RepoSlug::parse(repo).unwrap_err();
                assert_eq!(err.kind(), ErrorKind::Configuration, "repo {repo:?}");
            }
        }
    }

    mod prepare_tests {
        use super::*;

        fn base() -> PluginConfig {
            PluginConfig {
                repo: "gh/org/repo".to_string(),
                sha: "abc".to_string(),
                ..PluginConfig::default()
            }
        }

        #[test]
        fn test_wait_is_prepared() {
            let prepared = PreparedAction::from_config(&base()).unwrap();
            assert_eq!(prepared.action(), Action::Wait);
            let PreparedAction::Wait(options) = prepared;
            assert_eq!(options.project_slug, "github/org/repo");
            assert!(options.workflow_pattern.is_match("anything"));
            assert_eq!(options.interval, Duration::from_secs(15));
        }

        #[test]
        fn test_trigger_is_rejected() {
            let config = PluginConfig {
                action: "trigger".to_string(),
                ..base()
            };
            let err = PreparedAction::from_config(&config).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration);
            assert!(err.to_string().contains("not supported yet"));
        }

        #[test]
        fn test_unknown_action_is_rejected() {
            let config = PluginConfig {
                action: "deploy".to_string(),
                ..base()
            };
            assert!(PreparedAction::from_config(&config).is_err());
        }

        #[test]
        fn test_invalid_pattern_is_rejected() {
            let config = PluginConfig {
                workflow: "build(".to_string(),
                ..base()
            };
            let err = PreparedAction::from_config(&config).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration);
        }

        #[test]
        fn test_empty_sha_is_rejected() {
            let config = PluginConfig {
                sha: " ".to_string(),
                ..base()
            };
            assert!(PreparedAction::from_config(&config).is_err());
        }

        #[test]
        fn test_empty_branch_means_no_filter() {
            let config = PluginConfig {
                branch: Some(String::new()),
                ..base()
            };
            let PreparedAction::Wait(options) = PreparedAction::from_config(&config).unwrap();
            assert!(options.branch.is_none());
        }
    }

    #[tokio::test]
    async fn test_missing_token_fails_before_any_request() {
        let mut server = mockito::Server::new_async().await;
        let any = server
            .mock("GET", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let config = PluginConfig {
            api_token: String::new(),
            ..config_for(&server)
        };
        let err = Plugin::new(config)
            .exec(CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Configuration);
        any.assert_async().await;
    }

    #[tokio::test]
    async fn test_exec_waits_for_workflows() {
        let mut server = mockito::Server::new_async().await;
        let me = server
            .mock("GET", "/v2/me")
            .match_header("circle-token", "t0ken")
            .with_body(r#"{"id": "u", "login": "bot", "name": "Bot"}"#)
            .expect(1)
            .create_async()
            .await;
        let _mock = server
            .mock("GET", "/v2/project/github/org/repo/pipeline")
            .match_query(Matcher::Exact("branch=main".into()))
            .with_body(
                r#"{"items": [{"id": "p1", "number": 9, "vcs": {"revision": "abc"}}], "next_page_token": null}"#,
            )
            .create_async()
            .await;
        let _mock = server
            .mock("GET", "/v2/pipeline/p1/workflow")
            .with_body(
                r#"{"items": [{"id": "w1", "name": "build", "status": "success"}], "next_page_token": null}"#,
            )
            .create_async()
            .await;

        let outcome = Plugin::new(config_for(&server))
            .exec(CancellationToken::new())
            .await
            .unwrap();

        let ActionOutcome::Waited(report) = outcome;
        assert_eq!(report.pipeline.number, 9);
        assert_eq!(report.workflows[0].name, "build");
        me.assert_async().await;
    }

    #[tokio::test]
    async fn test_cancel_during_startup_delay() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/me")
            .with_body(r#"{"id": "u", "login": "bot", "name": "Bot"}"#)
            .create_async()
            .await;
        let pipelines = server
            .mock("GET", "/v2/project/github/org/repo/pipeline")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let config = PluginConfig {
            startup_delay: Duration::from_secs(3600),
            ..config_for(&server)
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let err = Plugin::new(config).exec(cancel).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancellation);
        pipelines.assert_async().await;
    }

    #[tokio::test]
    async fn test_wait_entry_point_rejects_bad_repo() {
        let err = wait(
            "ftp://example.com/repo",
            "abc",
            None,
            ".+",
            Duration::from_secs(1),
            "token",
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_wait_entry_point_pauses_before_lookup() {
        let mut server = mockito::Server::new_async().await;
        let me = server
            .mock("GET", "/v2/me")
            .with_body(r#"{"id": "u", "login": "bot", "name": "Bot"}"#)
            .expect(1)
            .create_async()
            .await;
        let pipelines = server
            .mock("GET", "/v2/project/github/org/repo/pipeline")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let config = PluginConfig {
            base_url: server.url(),
            ..wait_config(
                "gh/org/repo",
                "abc",
                Some("main"),
                ".+",
                Duration::from_millis(10),
                "t0ken",
            )
        };
        assert_eq!(config.startup_delay, Duration::from_secs(5));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let err = Plugin::new(config).exec(cancel).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancellation);
        me.assert_async().await;
        pipelines.assert_async().await;
    }
}
