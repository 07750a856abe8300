//! Where the YouTube access token comes from, and where it goes back to.
//!
//! A rotation run is unattended, so it only ever uses [`CachedCredentials`]:
//! load `token.json`, refresh it if it has expired, and give up otherwise.
//! [`InteractiveGrant`] exists for the one-off `authorize` setup step that
//! writes the cache in the first place.

use crate::error::RotationError;
use crate::oauth::OAuthManager;
use eyre::Context;
use jiff::{SignedDuration, Timestamp};
use oauth2::TokenResponse;
use oauth2::basic::BasicTokenResponse;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Tokens are treated as expired this long before Google says they are.
const EXPIRY_SAFETY_MARGIN: SignedDuration = SignedDuration::from_mins(5);

/// Used when the token response does not say how long the token lives.
const DEFAULT_LIFETIME: SignedDuration = SignedDuration::from_mins(55);

/// An OAuth token together with the moment it stops being usable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeBoundAccessToken {
    token: BasicTokenResponse,
    /// When the access token expires, safety margin already subtracted.
    expires_at: Timestamp,
}

impl TimeBoundAccessToken {
    /// A token that must be refreshed before first use.
    pub fn expired(token: BasicTokenResponse) -> Self {
        Self {
            expires_at: Timestamp::UNIX_EPOCH,
            token,
        }
    }

    /// A token issued just now.
    pub fn new(token: BasicTokenResponse) -> Self {
        Self::issued_at(token, Timestamp::now())
    }

    pub fn issued_at(token: BasicTokenResponse, issued: Timestamp) -> Self {
        let lifetime = token
            .expires_in()
            .and_then(|d| SignedDuration::try_from(d).ok())
            .map(|d| d - EXPIRY_SAFETY_MARGIN)
            .unwrap_or(DEFAULT_LIFETIME);
        Self {
            expires_at: issued.checked_add(lifetime).unwrap_or(issued),
            token,
        }
    }

    pub fn access_token(&self) -> &str {
        self.token.access_token().secret()
    }

    pub fn expires_at(&self) -> Timestamp {
        self.expires_at
    }

    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    /// Refreshes this token in place, keeping the old refresh token if Google
    /// does not send a new one.
    ///
    /// Returns `Ok(false)` if the token could not be refreshed (no refresh
    /// token, or the grant was revoked).
    pub async fn refresh(&mut self, oauth: &OAuthManager) -> eyre::Result<bool> {
        tracing::trace!("refreshing token");
        let Some(new_token) = oauth
            .refresh_token(&self.token)
            .await
            .context("refresh OAuth token")?
        else {
            return Ok(false);
        };

        let old_token = std::mem::replace(self, Self::new(new_token));
        if self.token.refresh_token().is_none() {
            tracing::trace!("new token lacks refresh token, preserving original");
            self.token
                .set_refresh_token(old_token.token.refresh_token().cloned());
        }
        Ok(true)
    }
}

/// The on-disk `token.json`.
#[derive(Debug, Clone)]
pub struct CredentialCache {
    path: PathBuf,
}

impl CredentialCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `Ok(None)` if there is no cache file yet.
    pub async fn load(&self) -> eyre::Result<Option<TimeBoundAccessToken>> {
        let json = match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("read credential cache {}", self.path.display()));
            }
        };
        let token = serde_json::from_str(&json)
            .with_context(|| format!("parse credential cache {}", self.path.display()))?;
        Ok(Some(token))
    }

    /// Writes through a temporary file so a crash never leaves a torn cache behind.
    pub async fn store(&self, token: &TimeBoundAccessToken) -> eyre::Result<()> {
        let json = serde_json::to_string_pretty(token).context("serialize credential")?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replace credential cache {}", self.path.display()))?;
        tracing::debug!(path = %self.path.display(), "stored credential");
        Ok(())
    }
}

/// Something that can hand out a currently valid access token.
#[allow(async_fn_in_trait)]
pub trait CredentialProvider {
    async fn credential(&self) -> eyre::Result<TimeBoundAccessToken>;
}

/// Load-or-refresh from the cache; never prompts anyone.
#[derive(Debug, Clone)]
pub struct CachedCredentials {
    pub cache: CredentialCache,
    pub oauth: OAuthManager,
}

impl CredentialProvider for CachedCredentials {
    async fn credential(&self) -> eyre::Result<TimeBoundAccessToken> {
        let unavailable = |reason: &str| RotationError::CredentialUnavailable {
            path: Some(self.cache.path().to_path_buf()),
            reason: reason.to_string(),
        };

        let Some(mut token) = self.cache.load().await? else {
            return Err(
                unavailable("no cached credential; run `broadcast-rotator authorize`").into(),
            );
        };
        if !token.is_expired_at(Timestamp::now()) {
            tracing::debug!(expires_at = %token.expires_at(), "cached credential still valid");
            return Ok(token);
        }

        tracing::info!("cached credential expired, refreshing");
        if !token.refresh(&self.oauth).await? {
            return Err(unavailable(
                "refresh token missing or revoked; run `broadcast-rotator authorize`",
            )
            .into());
        }
        self.cache.store(&token).await?;
        Ok(token)
    }
}

/// The browser consent flow, persisted to the cache on success.
#[derive(Debug, Clone)]
pub struct InteractiveGrant {
    pub cache: CredentialCache,
    pub oauth: OAuthManager,
}

impl CredentialProvider for InteractiveGrant {
    async fn credential(&self) -> eyre::Result<TimeBoundAccessToken> {
        let token = self
            .oauth
            .authenticate()
            .await
            .context("authorize user to YouTube")?;
        let token = TimeBoundAccessToken::new(token);
        self.cache.store(&token).await?;
        tracing::info!(path = %self.cache.path().display(), "stored new credential");
        Ok(token)
    }
}
