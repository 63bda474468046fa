//! Bearer tokens for the Sheets API
//!
//! Two providers behind one trait: a static token handed in via config (dev
//! and CI), and the OAuth authorized-user refresh flow driven by a
//! credentials JSON file. Fetched tokens are cached with their fetch time
//! and replaced shortly before they expire.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Refresh slightly before the reported expiry so a token never goes stale
/// mid-request.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("failed to read credentials file {path}: {source}")]
    Credentials { path: PathBuf, source: std::io::Error },
    #[error("credentials file {path} is not valid: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("token endpoint returned {status}: {body}")]
    Endpoint { status: reqwest::StatusCode, body: String },
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn bearer_token(&self) -> Result<String, AuthError>;
}

/// Fixed token, no refresh. Useful in development and in tests.
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: &str) -> Self {
        Self { token: token.to_string() }
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn bearer_token(&self) -> Result<String, AuthError> {
        Ok(self.token.clone())
    }
}

/// A fetched access token plus when it was fetched and how long it lives.
#[derive(Debug, Clone)]
pub struct CachedToken {
    pub value: String,
    pub fetched_at: Instant,
    pub lifetime: Duration,
}

impl CachedToken {
    pub fn is_fresh(&self, now: Instant) -> bool {
        let age = now.saturating_duration_since(self.fetched_at);
        age + EXPIRY_MARGIN < self.lifetime
    }
}

/// The authorized-user credentials JSON written by Google's OAuth tooling.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizedUserCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl AuthorizedUserCredentials {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AuthError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|source| AuthError::Credentials { path: path.to_path_buf(), source })?;
        serde_json::from_str(&content)
            .map_err(|source| AuthError::Parse { path: path.to_path_buf(), source })
    }
}

/// Exchanges a long-lived refresh token for short-lived access tokens,
/// caching each until shortly before expiry.
pub struct OauthRefresher {
    http: reqwest::Client,
    credentials: AuthorizedUserCredentials,
    cached: Mutex<Option<CachedToken>>,
}

impl OauthRefresher {
    pub fn new(credentials: AuthorizedUserCredentials) -> Self {
        Self { http: reqwest::Client::new(), credentials, cached: Mutex::new(None) }
    }

    pub fn from_credentials_file<P: AsRef<Path>>(path: P) -> Result<Self, AuthError> {
        Ok(Self::new(AuthorizedUserCredentials::from_file(path)?))
    }

    fn cached_value(&self, now: Instant) -> Option<String> {
        let cached = self.cached.lock();
        cached.as_ref().filter(|t| t.is_fresh(now)).map(|t| t.value.clone())
    }

    async fn refresh(&self) -> Result<CachedToken, AuthError> {
        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: u64,
        }

        let response = self
            .http
            .post(TOKEN_ENDPOINT)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("refresh_token", self.credentials.refresh_token.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Endpoint { status, body });
        }

        let token: TokenResponse = response.json().await?;
        debug!(expires_in = token.expires_in, "oauth_token_refreshed");
        Ok(CachedToken {
            value: token.access_token,
            fetched_at: Instant::now(),
            lifetime: Duration::from_secs(token.expires_in),
        })
    }
}

#[async_trait]
impl TokenProvider for OauthRefresher {
    async fn bearer_token(&self) -> Result<String, AuthError> {
        if let Some(value) = self.cached_value(Instant::now()) {
            return Ok(value);
        }
        let token = self.refresh().await?;
        let value = token.value.clone();
        *self.cached.lock() = Some(token);
        Ok(value)
    }
}
