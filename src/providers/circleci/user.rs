use log::debug;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::client::CircleCiClient;
use crate::error::Result;

/// The user owning the API token.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub login: String,
}

impl CircleCiClient {
    pub async fn get_myself(&self, cancel: &CancellationToken) -> Result<User> {
        self.get_json("me", &[], cancel).await
    }

    /// Verifies the token by resolving the current user.
    pub async fn authenticate(&self, cancel: &CancellationToken) -> Result<User> {
        let user = self.get_myself(cancel).await?;
        debug!("Authenticated as {} ({})", user.name, user.login);
        Ok(user)
    }
}
