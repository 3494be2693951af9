use crate::domain::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Maps a bearer credential to the user id it was issued for.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// `Ok(None)` means the credential is unknown or expired.
    async fn resolve(&self, credential: &str) -> Result<Option<String>>;
}

#[derive(Deserialize)]
struct AuthUser {
    id: String,
}

/// Resolves access tokens against the hosted auth service (`GET /auth/v1/user`).
pub struct RemoteIdentityResolver {
    client: reqwest::Client,
    user_endpoint: Url,
    anon_key: String,
}

impl RemoteIdentityResolver {
    pub fn new(auth_url: &str, anon_key: &str) -> Result<Self> {
        let user_endpoint = user_endpoint(auth_url)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::AuthError(format!("Failed to build auth client: {e}")))?;

        Ok(Self {
            client,
            user_endpoint,
            anon_key: anon_key.to_string(),
        })
    }
}

fn user_endpoint(auth_url: &str) -> Result<Url> {
    let base = auth_url.trim_end_matches('/');
    if base.is_empty() {
        return Err(AppError::ConfigError("auth.url is empty".to_string()));
    }
    Url::parse(&format!("{base}/auth/v1/user"))
        .map_err(|e| AppError::ConfigError(format!("Invalid auth.url '{auth_url}': {e}")))
}

#[async_trait]
impl IdentityResolver for RemoteIdentityResolver {
    async fn resolve(&self, credential: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(self.user_endpoint.clone())
            .bearer_auth(credential)
            .header("apikey", &self.anon_key)
            .send()
            .await
            .map_err(|e| AppError::AuthError(format!("Auth request failed: {e}")))?;

        match response.status() {
            status if status.is_success() => {
                let user: AuthUser = response
                    .json()
                    .await
                    .map_err(|e| AppError::AuthError(format!("Invalid auth response: {e}")))?;
                Ok(Some(user.id))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                debug!("Auth service rejected credential");
                Ok(None)
            }
            status => Err(AppError::AuthError(format!(
                "Auth service returned {status}"
            ))),
        }
    }
}

/// Fixed token table, used by tests and local development.
#[derive(Default)]
pub struct StaticIdentityResolver {
    tokens: HashMap<String, String>,
}

impl StaticIdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: &str, user_id: &str) -> Self {
        self.tokens.insert(token.to_string(), user_id.to_string());
        self
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentityResolver {
    async fn resolve(&self, credential: &str) -> Result<Option<String>> {
        Ok(self.tokens.get(credential).cloned())
    }
}
