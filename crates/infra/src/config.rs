//! Process configuration loaded from environment variables.
//!
//! Every loader has a `from_lookup` form taking a key lookup closure so tests can
//! feed a fixed map instead of mutating the process environment.

use core::fmt;
use core::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use restohub_core::RestError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: '{value}'")]
    Invalid { name: &'static str, value: String },
}

impl From<ConfigError> for RestError {
    fn from(err: ConfigError) -> Self {
        RestError::internal("service misconfigured").with_cause(err)
    }
}

/// Supported single sign-on providers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SsoProvider {
    Google,
    Authentik,
}

impl SsoProvider {
    pub const ALL: [SsoProvider; 2] = [SsoProvider::Google, SsoProvider::Authentik];

    pub fn as_str(self) -> &'static str {
        match self {
            SsoProvider::Google => "google",
            SsoProvider::Authentik => "authentik",
        }
    }
}

impl fmt::Display for SsoProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SsoProvider {
    type Err = RestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google" => Ok(SsoProvider::Google),
            "authentik" => Ok(SsoProvider::Authentik),
            other => Err(RestError::bad_request(format!("unknown SSO provider '{other}'"))),
        }
    }
}

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USER_INFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";

/// OAuth2 client settings for one provider.
#[derive(Clone, PartialEq, Eq)]
pub struct SsoProviderConfig {
    pub provider: SsoProvider,
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub redirect_url: String,
    pub user_info_url: String,
    pub scopes: Vec<String>,
    /// Ask for a refresh token with `access_type=offline`.
    pub offline_access: bool,
}

impl fmt::Debug for SsoProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SsoProviderConfig")
            .field("provider", &self.provider)
            .field("client_id", &self.client_id)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("redirect_url", &self.redirect_url)
            .field("user_info_url", &self.user_info_url)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

impl SsoProviderConfig {
    pub fn from_env(provider: SsoProvider) -> Result<Self, ConfigError> {
        Self::from_lookup(provider, |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(provider: SsoProvider, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        match provider {
            SsoProvider::Google => Ok(Self {
                provider,
                client_id: required("GOOGLE_CLIENT_ID")?,
                client_secret: required("GOOGLE_SECRET_KEY")?,
                auth_url: GOOGLE_AUTH_URL.to_string(),
                token_url: GOOGLE_TOKEN_URL.to_string(),
                redirect_url: required("GOOGLE_SSO_CALLBACK_URL")?,
                user_info_url: lookup("GOOGLE_SSO_USER_INFO_URL")
                    .unwrap_or_else(|| GOOGLE_USER_INFO_URL.to_string()),
                scopes: vec!["email".into(), "profile".into()],
                offline_access: true,
            }),
            SsoProvider::Authentik => Ok(Self {
                provider,
                client_id: required("AUTHENTIK_CLIENT_ID")?,
                client_secret: required("AUTHENTIK_SECRET_KEY")?,
                auth_url: required("AUTH_URL")?,
                token_url: required("TOKEN_URL")?,
                redirect_url: required("AUTHENTIK_SSO_CALLBACK_URL")?,
                user_info_url: required("AUTHENTIK_SSO_USER_INFO_URL")?,
                scopes: vec![
                    "email".into(),
                    "profile".into(),
                    "offline_access".into(),
                    "openid".into(),
                ],
                offline_access: false,
            }),
        }
    }
}

/// Attributes of the session cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieSettings {
    pub name: String,
    pub domain: String,
    pub max_age_secs: i64,
    pub secure: bool,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            name: "restohub_session".to_string(),
            domain: "localhost".to_string(),
            max_age_secs: 2000,
            secure: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_address: String,
    /// Postgres connection string. Absent means in-memory stores.
    pub database_url: Option<String>,
    pub cookie: CookieSettings,
    pub verifier_ttl: Duration,
    pub http_timeout: Duration,
    pub invitation_ttl: chrono::Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = CookieSettings::default();
        let cookie = CookieSettings {
            name: lookup("AUTH_COOKIE_NAME").unwrap_or(defaults.name),
            domain: lookup("AUTH_COOKIE_DOMAIN").unwrap_or(defaults.domain),
            max_age_secs: parse_or(&lookup, "AUTH_COOKIE_MAX_AGE_SECS", defaults.max_age_secs)?,
            secure: parse_or(&lookup, "AUTH_COOKIE_SECURE", defaults.secure)?,
        };

        Ok(Self {
            bind_address: lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            database_url: lookup("DATABASE_URL").filter(|v| !v.trim().is_empty()),
            cookie,
            verifier_ttl: Duration::from_secs(parse_or(&lookup, "SSO_VERIFIER_TTL_SECS", 600u64)?),
            http_timeout: Duration::from_secs(parse_or(&lookup, "SSO_HTTP_TIMEOUT_SECS", 10u64)?),
            invitation_ttl: invitation_ttl(&lookup)?,
        })
    }
}

fn invitation_ttl<F>(lookup: &F) -> Result<chrono::Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    const NAME: &str = "INVITATION_TTL_HOURS";
    let hours: i64 = parse_or(lookup, NAME, 168)?;
    chrono::Duration::try_hours(hours)
        .filter(|ttl| *ttl > chrono::Duration::zero())
        .filter(|ttl| chrono::Utc::now().checked_add_signed(*ttl).is_some())
        .ok_or_else(|| ConfigError::Invalid {
            name: NAME,
            value: hours.to_string(),
        })
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
