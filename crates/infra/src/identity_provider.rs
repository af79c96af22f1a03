//! OAuth2 identity provider client.
//!
//! [`IdentityProvider`] is the seam between the session lifecycle and the
//! external authorization server: build the authorization URL, exchange a code
//! (with its PKCE verifier) for tokens, fetch the user profile and refresh tokens.
//! [`OAuthClient`] implements it over `reqwest` for any provider described by an
//! [`SsoProviderConfig`]; tests substitute scripted fakes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use restohub_auth::{NewPrincipal, PkceVerifier, Role};
use restohub_core::RestError;

use crate::config::{SsoProvider, SsoProviderConfig};

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("invalid provider configuration: {0}")]
    Config(String),

    #[error("token exchange failed: {0}")]
    Exchange(String),

    #[error("profile fetch failed: {0}")]
    Profile(String),

    #[error("token refresh failed: {0}")]
    Refresh(String),
}

/// Tokens issued by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Subset of the provider's user-info document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProfileInfo {
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub family_name: String,
    #[serde(default)]
    pub picture: String,
}

impl ProfileInfo {
    pub fn into_new_principal(self, role: Role) -> NewPrincipal {
        NewPrincipal {
            email: self.email,
            role,
            first_name: self.given_name,
            last_name: self.family_name,
            avatar_url: self.picture,
        }
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Provider name recorded on sessions.
    fn name(&self) -> &str;

    fn authorization_url(&self, state: &str, code_challenge: &str) -> Result<String, ProviderError>;

    async fn exchange_code(
        &self,
        code: &str,
        verifier: &PkceVerifier,
    ) -> Result<TokenGrant, ProviderError>;

    async fn fetch_profile(&self, access_token: &str) -> Result<ProfileInfo, ProviderError>;

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
}

impl TokenResponse {
    fn into_grant(self, now: DateTime<Utc>) -> TokenGrant {
        let lifetime = self.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        TokenGrant {
            access_token: self.access_token,
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
            id_token: self.id_token.filter(|t| !t.is_empty()),
            expires_at: now + chrono::Duration::seconds(lifetime),
        }
    }
}

/// Authorization-code client over HTTP.
pub struct OAuthClient {
    config: SsoProviderConfig,
    http: reqwest::Client,
}

impl OAuthClient {
    pub fn new(config: SsoProviderConfig, timeout: Duration) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Config(e.to_string()))?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &SsoProviderConfig {
        &self.config
    }

    async fn token_request(
        &self,
        params: &[(&str, &str)],
        wrap: fn(String) -> ProviderError,
    ) -> Result<TokenGrant, ProviderError> {
        let response = self
            .http
            .post(&self.config.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| wrap(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(wrap(format!("status {status}: {body}")));
        }

        let token: TokenResponse = response.json().await.map_err(|e| wrap(e.to_string()))?;
        Ok(token.into_grant(Utc::now()))
    }
}

#[async_trait]
impl IdentityProvider for OAuthClient {
    fn name(&self) -> &str {
        self.config.provider.as_str()
    }

    fn authorization_url(&self, state: &str, code_challenge: &str) -> Result<String, ProviderError> {
        let scope = self.config.scopes.join(" ");
        let mut params = vec![
            ("response_type", "code"),
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_url.as_str()),
            ("scope", scope.as_str()),
            ("state", state),
            ("code_challenge", code_challenge),
            ("code_challenge_method", "S256"),
        ];
        if self.config.offline_access {
            params.push(("access_type", "offline"));
        }

        let url = Url::parse_with_params(&self.config.auth_url, &params)
            .map_err(|e| ProviderError::Config(format!("auth url: {e}")))?;
        Ok(url.into())
    }

    async fn exchange_code(
        &self,
        code: &str,
        verifier: &PkceVerifier,
    ) -> Result<TokenGrant, ProviderError> {
        debug!(provider = self.name(), "exchanging authorization code");
        self.token_request(
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code_verifier", verifier.as_str()),
            ],
            ProviderError::Exchange,
        )
        .await
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<ProfileInfo, ProviderError> {
        let response = self
            .http
            .get(&self.config.user_info_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ProviderError::Profile(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Profile(format!("status {status}")));
        }

        response
            .json::<ProfileInfo>()
            .await
            .map_err(|e| ProviderError::Profile(e.to_string()))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, ProviderError> {
        debug!(provider = self.name(), "refreshing token");
        self.token_request(
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ],
            ProviderError::Refresh,
        )
        .await
    }
}

/// Configured providers, resolved by the `:provider` path segment.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<SsoProvider, Arc<dyn IdentityProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: SsoProvider, client: Arc<dyn IdentityProvider>) -> Self {
        self.providers.insert(provider, client);
        self
    }

    /// Register every provider whose environment is complete. Incomplete ones
    /// are skipped with a warning.
    pub fn from_env(timeout: Duration) -> Self {
        Self::from_lookup(|key| std::env::var(key).ok(), timeout)
    }

    pub fn from_lookup<F>(lookup: F, timeout: Duration) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut registry = Self::new();
        for provider in SsoProvider::ALL {
            let client = SsoProviderConfig::from_lookup(provider, &lookup)
                .map_err(|e| e.to_string())
                .and_then(|config| OAuthClient::new(config, timeout).map_err(|e| e.to_string()));
            match client {
                Ok(client) => registry = registry.with(provider, Arc::new(client)),
                Err(reason) => warn!(%provider, %reason, "SSO provider not configured"),
            }
        }
        registry
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn IdentityProvider>, RestError> {
        let provider: SsoProvider = name.parse()?;
        self.providers.get(&provider).cloned().ok_or_else(|| {
            RestError::bad_request(format!("SSO provider '{provider}' is not configured"))
        })
    }
}
