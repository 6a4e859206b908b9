//! Revoking a tenant's connection to a third-party provider.

use crate::config::{OAuthClient, OAuthClients};
use crate::credentials::{CredentialVault, TokenRefresher};
use crate::errors::LorelaiError;
use crate::model::Provider;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

#[async_trait]
pub trait Revoker: Send + Sync {
    fn provider(&self) -> Provider;
    /// Invalidates `token` at the provider.
    async fn revoke(&self, token: &str) -> anyhow::Result<()>;
}

fn integration_err(provider: Provider, msg: impl std::fmt::Display) -> anyhow::Error {
    LorelaiError::Integration(format!("{} revoke failed: {}", provider.display_name(), msg)).into()
}

pub struct SlackRevoker {
    http: reqwest::Client,
    url: String,
}

impl SlackRevoker {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            url: "https://slack.com/api/auth.revoke".to_string(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

impl Default for SlackRevoker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Revoker for SlackRevoker {
    fn provider(&self) -> Provider {
        Provider::Slack
    }

    async fn revoke(&self, token: &str) -> anyhow::Result<()> {
        let resp = self
            .http
            .post(&self.url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| integration_err(Provider::Slack, e))?;
        if !resp.status().is_success() {
            return Err(integration_err(Provider::Slack, resp.status()));
        }
        // Slack reports failures in the body with a 200.
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| integration_err(Provider::Slack, e))?;
        if body.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            let reason = body
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error");
            return Err(integration_err(Provider::Slack, reason));
        }
        Ok(())
    }
}

pub struct GoogleRevoker {
    http: reqwest::Client,
    url: String,
}

impl GoogleRevoker {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            url: "https://oauth2.googleapis.com/revoke".to_string(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

impl Default for GoogleRevoker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Revoker for GoogleRevoker {
    fn provider(&self) -> Provider {
        Provider::GoogleDrive
    }

    async fn revoke(&self, token: &str) -> anyhow::Result<()> {
        let resp = self
            .http
            .post(&self.url)
            .query(&[("token", token)])
            .header("content-type", "application/x-www-form-urlencoded")
            .send()
            .await
            .map_err(|e| integration_err(Provider::GoogleDrive, e))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        // invalid_token: the grant is already gone.
        if status == reqwest::StatusCode::BAD_REQUEST && body.contains("invalid_token") {
            return Ok(());
        }
        Err(integration_err(Provider::GoogleDrive, format!("{} {}", status, body)))
    }
}

pub struct GithubRevoker {
    client: OAuthClient,
    http: reqwest::Client,
    base_url: String,
}

impl GithubRevoker {
    pub fn new(client: OAuthClient) -> Self {
        Self {
            client,
            http: reqwest::Client::new(),
            base_url: "https://api.github.com".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl Revoker for GithubRevoker {
    fn provider(&self) -> Provider {
        Provider::Github
    }

    async fn revoke(&self, token: &str) -> anyhow::Result<()> {
        let url = format!(
            "{}/applications/{}/grant",
            self.base_url.trim_end_matches('/'),
            self.client.client_id
        );
        let resp = self
            .http
            .delete(url)
            .basic_auth(&self.client.client_id, Some(self.client.client_secret.expose()))
            .header("accept", "application/vnd.github+json")
            .header("user-agent", "lorelai")
            .json(&serde_json::json!({ "access_token": token }))
            .send()
            .await
            .map_err(|e| integration_err(Provider::Github, e))?;
        let status = resp.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(integration_err(Provider::Github, status))
    }
}

/// Builds one revoker per provider. GitHub needs client credentials and is
/// left out when they are not configured.
pub fn default_revokers(oauth: &OAuthClients) -> HashMap<Provider, Arc<dyn Revoker>> {
    let mut map: HashMap<Provider, Arc<dyn Revoker>> = HashMap::new();
    map.insert(Provider::Slack, Arc::new(SlackRevoker::new()));
    map.insert(Provider::GoogleDrive, Arc::new(GoogleRevoker::new()));
    if let Some(gh) = &oauth.github {
        map.insert(Provider::Github, Arc::new(GithubRevoker::new(gh.clone())));
    }
    map
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokeOutcome {
    pub provider: Provider,
    pub message: String,
}

/// Revokes at the provider first and deletes the local credential only when
/// that succeeds, so a failed revoke can be retried.
///
/// Providers with a refresher get an expired access token refreshed before
/// the revoke call; Google answers `invalid_token` for an expired token and
/// would otherwise leave the grant alive.
#[derive(Clone)]
pub struct RevocationService {
    vault: CredentialVault,
    revokers: HashMap<Provider, Arc<dyn Revoker>>,
    refreshers: HashMap<Provider, Arc<dyn TokenRefresher>>,
}

impl RevocationService {
    pub fn new(vault: CredentialVault, revokers: HashMap<Provider, Arc<dyn Revoker>>) -> Self {
        Self {
            vault,
            revokers,
            refreshers: HashMap::new(),
        }
    }

    pub fn with_refreshers(
        mut self,
        refreshers: HashMap<Provider, Arc<dyn TokenRefresher>>,
    ) -> Self {
        self.refreshers = refreshers;
        self
    }

    pub async fn revoke(
        &self,
        org_id: i64,
        user_id: i64,
        provider: Provider,
    ) -> anyhow::Result<RevokeOutcome> {
        let cred = self.vault.get(org_id, user_id, provider)?.ok_or_else(|| {
            LorelaiError::not_found(format!("no {} integration connected", provider.display_name()))
        })?;

        let revoker = self.revokers.get(&provider).ok_or_else(|| {
            LorelaiError::Integration(format!(
                "{} is not configured on this server",
                provider.display_name()
            ))
        })?;

        let cred = match self.refreshers.get(&provider) {
            Some(refresher) => {
                self.vault
                    .get_valid(org_id, user_id, refresher.as_ref())
                    .await?
            }
            None => cred,
        };

        if let Err(e) = revoker.revoke(&cred.access_token).await {
            tracing::warn!(
                event = "revoke_failed",
                org_id,
                user_id,
                provider = %provider,
                error = %e
            );
            return Err(e);
        }

        self.vault.remove(org_id, user_id, provider)?;
        Ok(RevokeOutcome {
            provider,
            message: format!("{} integration revoked", provider.display_name()),
        })
    }
}
