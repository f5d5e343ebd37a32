use std::sync::Arc;

use log::debug;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::auth::Token;
use crate::error::{CiWaitError, Result};

/// Public CircleCI API endpoint, without the version segment.
pub const API_ENDPOINT: &str = "https://circleci.com/api";

/// Header carrying the personal API token.
pub const HEADER_API_TOKEN: &str = "circle-token";

const USER_AGENT: &str = concat!("ciwait/", env!("CARGO_PKG_VERSION"));

/// CircleCI API versions known to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApiVersion {
    V1_1,
    #[default]
    V2,
}

impl ApiVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::V1_1 => "v1.1",
            Self::V2 => "v2",
        }
    }

    pub fn is_supported(self) -> bool {
        matches!(self, Self::V2)
    }
}

/// Error envelope returned by the API. A non-empty message means the call failed.
#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: Option<String>,
}

impl ErrorResponse {
    fn into_message(self) -> Option<String> {
        self.message.filter(|m| !m.is_empty())
    }
}

/// Thin wrapper over `reqwest::Client` that knows the CircleCI base URL and
/// authentication header.
pub struct CircleCiClient {
    client: Client,
    api_url: Url,
}

impl CircleCiClient {
    /// Builds a client for `base_url` (e.g. <https://circleci.com/api>) and the given API version.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the version is unsupported, the base
    /// URL is invalid, or the token cannot be used as a header value.
    pub fn new(base_url: &str, version: ApiVersion, token: &Token) -> Result<Self> {
        if !version.is_supported() {
            return Err(CiWaitError::Config(format!(
                "api version {} is not supported yet",
                version.as_str()
            )));
        }

        let mut token_value = HeaderValue::from_str(token.as_str())
            .map_err(|e| CiWaitError::Config(format!("Invalid api token: {e}")))?;
        token_value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(HeaderName::from_static(HEADER_API_TOKEN), token_value);

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| CiWaitError::Config(format!("Failed to create HTTP client: {e}")))?;

        let api_url = Url::parse(&format!(
            "{}/{}/",
            base_url.trim_end_matches('/'),
            version.as_str()
        ))
        .map_err(|e| CiWaitError::Config(format!("Invalid base URL: {e}")))?;

        Ok(Self { client, api_url })
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.api_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| CiWaitError::Config(format!("Invalid API path {path}: {e}")))
    }

    /// Sends one GET request and decodes the body into `T`.
    ///
    /// A body carrying a non-empty `message` is treated as a provider error
    /// whatever the HTTP status. Both the request and the body read are
    /// abandoned as soon as `cancel` fires.
    pub async fn get_json<T>(
        &self,
        path: &str,
        query: &[(String, String)],
        cancel: &CancellationToken,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let transport = |source: reqwest::Error| CiWaitError::Transport {
            path: path.to_string(),
            source: Arc::new(source),
        };

        debug!("GET {path} {query:?}");
        let request = self.client.get(url).query(query);

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(CiWaitError::Cancelled),
            response = request.send() => response.map_err(transport)?,
        };

        let status = response.status();
        let status_error = response.error_for_status_ref().err();

        let body = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(CiWaitError::Cancelled),
            body = response.bytes() => body.map_err(transport)?,
        };

        let envelope = serde_json::from_slice::<ErrorResponse>(&body).unwrap_or_default();
        if let Some(message) = envelope.into_message() {
            return Err(CiWaitError::Provider {
                path: path.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        if let Some(source) = status_error {
            return Err(transport(source));
        }

        serde_json::from_slice(&body).map_err(|source| CiWaitError::Decode {
            path: path.to_string(),
            source: Arc::new(source),
        })
    }
}
