//! Control of the restreaming service that relays the camera feed to YouTube.
//!
//! The restreamer (datarhei Restreamer, core API v3) runs one egress process
//! per destination. Around a rotation the YouTube egress is stopped, so no
//! media is pushed at a broadcast that is being torn down, and started again
//! once the new broadcast is bound.

use eyre::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Commands understood by a restreamer process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EgressCommand {
    Start,
    Stop,
}

impl fmt::Display for EgressCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Stop => write!(f, "stop"),
        }
    }
}

/// Something that can pause and resume the outbound feed to YouTube.
#[allow(async_fn_in_trait)]
pub trait EgressControl {
    async fn send(&self, command: EgressCommand) -> eyre::Result<()>;
}

/// Where the restreamer lives and which process to drive.
#[derive(Debug, Clone, PartialEq)]
pub struct RestreamerConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Path of the YouTube egress process' command endpoint, e.g.
    /// `/api/v3/process/restreamer-ui%3Aegress%3Ayoutube%3A<uuid>/command`.
    pub command_path: String,
}

impl RestreamerConfig {
    fn url(&self, path: &str) -> String {
        format!("http://{}:{}{}", self.host, self.port, path)
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    access_token: String,
}

#[derive(Serialize)]
struct CommandRequest {
    command: EgressCommand,
}

/// A logged-in restreamer API session.
#[derive(Debug, Clone)]
pub struct Restreamer {
    config: RestreamerConfig,
    client: reqwest::Client,
    access_token: String,
}

impl Restreamer {
    /// Exchanges the configured username and password for a bearer token.
    #[tracing::instrument(skip(config), fields(host = %config.host, port = config.port))]
    pub async fn login(config: RestreamerConfig) -> eyre::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("build restreamer HTTP client")?;

        let url = config.url("/api/login");
        let response = client
            .post(&url)
            .header(http::header::ACCEPT, "application/json")
            .json(&LoginRequest {
                username: &config.username,
                password: &config.password,
            })
            .send()
            .await
            .with_context(|| format!("send login request to {url}"))?;
        let status = response.status();
        if !status.is_success() {
            eyre::bail!("restreamer login failed with status {status}");
        }
        let LoginResponse { access_token } = response
            .json()
            .await
            .context("parse restreamer login response")?;

        tracing::debug!("logged in to restreamer");
        Ok(Self {
            config,
            client,
            access_token,
        })
    }
}

impl EgressControl for Restreamer {
    #[tracing::instrument(skip(self), fields(path = %self.config.command_path))]
    async fn send(&self, command: EgressCommand) -> eyre::Result<()> {
        let url = self.config.url(&self.config.command_path);
        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.access_token)
            .json(&CommandRequest { command })
            .send()
            .await
            .with_context(|| format!("send {command} command to restreamer"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            eyre::bail!("restreamer rejected {command} command with status {status}: {body}");
        }
        tracing::info!(%command, "restreamer egress command accepted");
        Ok(())
    }
}
