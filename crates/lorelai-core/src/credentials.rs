//! Per-tenant OAuth credential records.
//!
//! `CredentialVault` is the only way to read or change a credential. Reads
//! through [`CredentialVault::get_valid`] refresh tokens that are about to
//! expire.

use crate::config::{OAuthClient, OAuthClients};
use crate::errors::LorelaiError;
use crate::model::{Credential, Provider, TokenGrant};
use crate::storage::Store;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// Tokens expiring within this window are refreshed before use.
const REFRESH_SKEW_SECS: i64 = 60;

#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> anyhow::Result<TokenGrant>;
    fn provider(&self) -> Provider;
}

#[derive(Clone)]
pub struct CredentialVault {
    store: Store,
}

impl CredentialVault {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Stores the grant returned by an OAuth callback or a refresh.
    pub fn save_grant(
        &self,
        org_id: i64,
        user_id: i64,
        provider: Provider,
        grant: &TokenGrant,
    ) -> anyhow::Result<()> {
        if grant.access_token.is_empty() {
            return Err(LorelaiError::validation("access token must not be empty").into());
        }
        let user = self
            .store
            .get_user(user_id)?
            .ok_or_else(|| LorelaiError::not_found(format!("user {}", user_id)))?;
        if user.org_id != Some(org_id) {
            return Err(LorelaiError::validation(format!(
                "user {} does not belong to organisation {}",
                user_id, org_id
            ))
            .into());
        }
        let expires_at = grant
            .expires_in
            .map(|secs| (Utc::now() + Duration::seconds(secs)).to_rfc3339());
        self.store
            .upsert_credential(org_id, user_id, provider, grant, expires_at)?;
        tracing::info!(
            event = "credential_saved",
            org_id,
            user_id,
            provider = %provider
        );
        Ok(())
    }

    pub fn get(
        &self,
        org_id: i64,
        user_id: i64,
        provider: Provider,
    ) -> anyhow::Result<Option<Credential>> {
        self.store.get_credential(org_id, user_id, provider)
    }

    /// Providers the organisation currently has any credential for.
    pub fn connected_providers(&self, org_id: i64) -> anyhow::Result<Vec<Provider>> {
        let mut out: Vec<Provider> = self
            .store
            .list_credentials(org_id)?
            .into_iter()
            .map(|c| c.provider)
            .collect();
        out.dedup();
        Ok(out)
    }

    pub fn remove(&self, org_id: i64, user_id: i64, provider: Provider) -> anyhow::Result<bool> {
        let removed = self.store.delete_credential(org_id, user_id, provider)?;
        if removed {
            tracing::info!(
                event = "credential_removed",
                org_id,
                user_id,
                provider = %provider
            );
        }
        Ok(removed)
    }

    /// Returns a credential whose access token is usable now, refreshing it
    /// through `refresher` when it expires within the skew window.
    pub async fn get_valid(
        &self,
        org_id: i64,
        user_id: i64,
        refresher: &dyn TokenRefresher,
    ) -> anyhow::Result<Credential> {
        let provider = refresher.provider();
        let cred = self.get(org_id, user_id, provider)?.ok_or_else(|| {
            LorelaiError::not_found(format!("{} credential for user {}", provider, user_id))
        })?;

        if !needs_refresh(cred.expires_at.as_deref(), Utc::now()) {
            return Ok(cred);
        }

        let refresh_token = cred.refresh_token.clone().ok_or_else(|| {
            LorelaiError::Integration(format!(
                "{} token expired and no refresh token is stored",
                provider
            ))
        })?;

        tracing::debug!(event = "credential_refresh", org_id, user_id, provider = %provider);
        let grant = refresher.refresh(&refresh_token).await?;
        self.save_grant(org_id, user_id, provider, &grant)?;
        self.get(org_id, user_id, provider)?.ok_or_else(|| {
            LorelaiError::not_found(format!("{} credential for user {}", provider, user_id)).into()
        })
    }
}

fn needs_refresh(expires_at: Option<&str>, now: DateTime<Utc>) -> bool {
    match expires_at.and_then(|s| DateTime::parse_from_rfc3339(s).ok()) {
        Some(t) => t.with_timezone(&Utc) <= now + Duration::seconds(REFRESH_SKEW_SECS),
        None => false,
    }
}

/// Google OAuth token endpoint.
pub struct GoogleTokenRefresher {
    client: OAuthClient,
    http: reqwest::Client,
    token_url: String,
}

impl GoogleTokenRefresher {
    pub fn new(client: OAuthClient) -> Self {
        Self {
            client,
            http: reqwest::Client::new(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
        }
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    pub fn shared(client: OAuthClient) -> Arc<dyn TokenRefresher> {
        Arc::new(Self::new(client))
    }
}

/// Refreshers for the providers whose client credentials are configured.
/// Only Google issues expiring tokens.
pub fn default_refreshers(oauth: &OAuthClients) -> HashMap<Provider, Arc<dyn TokenRefresher>> {
    let mut map = HashMap::new();
    if let Some(google) = &oauth.google {
        map.insert(Provider::GoogleDrive, GoogleTokenRefresher::shared(google.clone()));
    }
    map
}

#[async_trait]
impl TokenRefresher for GoogleTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> anyhow::Result<TokenGrant> {
        let resp = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client.client_id.as_str()),
                ("client_secret", self.client.client_secret.expose()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| LorelaiError::Integration(format!("google token refresh: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(LorelaiError::Integration(format!(
                "google token refresh failed ({}): {}",
                status, body
            ))
            .into());
        }

        let json: serde_json::Value = resp.json().await?;
        let access_token = json
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                LorelaiError::Integration("google token response missing access_token".into())
            })?
            .to_string();

        Ok(TokenGrant {
            access_token,
            refresh_token: json
                .get("refresh_token")
                .and_then(|v| v.as_str())
                .map(String::from),
            token_type: json
                .get("token_type")
                .and_then(|v| v.as_str())
                .map(String::from),
            scope: json.get("scope").and_then(|v| v.as_str()).map(String::from),
            expires_in: json.get("expires_in").and_then(|v| v.as_i64()),
        })
    }

    fn provider(&self) -> Provider {
        Provider::GoogleDrive
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRefresher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TokenRefresher for CountingRefresher {
        async fn refresh(&self, refresh_token: &str) -> anyhow::Result<TokenGrant> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(refresh_token, "r-1");
            Ok(TokenGrant {
                access_token: "fresh".into(),
                expires_in: Some(3600),
                ..Default::default()
            })
        }

        fn provider(&self) -> Provider {
            Provider::GoogleDrive
        }
    }

    fn setup() -> (CredentialVault, i64, i64) {
        let store = Store::memory().unwrap();
        store.init_schema().unwrap();
        let org = store.create_organisation("Acme").unwrap();
        let user = store
            .create_user(Some(org.id), "Ada", "ada@acme.test")
            .unwrap();
        (CredentialVault::new(store), org.id, user.user_id)
    }

    #[test]
    fn refresh_window() {
        let now = Utc::now();
        let soon = (now + Duration::seconds(30)).to_rfc3339();
        let later = (now + Duration::seconds(3600)).to_rfc3339();
        assert!(needs_refresh(Some(&soon), now));
        assert!(!needs_refresh(Some(&later), now));
        assert!(!needs_refresh(None, now));
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_keeps_refresh_token() {
        let (vault, org, user) = setup();
        vault
            .save_grant(
                org,
                user,
                Provider::GoogleDrive,
                &TokenGrant {
                    access_token: "stale".into(),
                    refresh_token: Some("r-1".into()),
                    expires_in: Some(-10),
                    ..Default::default()
                },
            )
            .unwrap();

        let refresher = CountingRefresher {
            calls: AtomicUsize::new(0),
        };
        let cred = vault.get_valid(org, user, &refresher).await.unwrap();
        assert_eq!(cred.access_token, "fresh");
        assert_eq!(cred.refresh_token.as_deref(), Some("r-1"));

        let again = vault.get_valid(org, user, &refresher).await.unwrap();
        assert_eq!(again.access_token, "fresh");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn grant_for_foreign_user_is_rejected() {
        let (vault, _org, user) = setup();
        let other = vault.store.create_organisation("Globex").unwrap();
        let err = vault
            .save_grant(
                other.id,
                user,
                Provider::Slack,
                &TokenGrant {
                    access_token: "xoxp".into(),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(err.to_string().contains("does not belong"));
    }
}
