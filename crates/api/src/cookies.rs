//! Session cookie helpers.
//!
//! The cookie value is the provider access token itself, which is also the
//! session lookup key.

use axum::http::{HeaderMap, header};
use cookie::time::Duration;
use cookie::{Cookie, SameSite};

use restohub_infra::CookieSettings;

pub fn session_cookie(settings: &CookieSettings, access_token: &str) -> Cookie<'static> {
    Cookie::build((settings.name.clone(), access_token.to_string()))
        .path("/")
        .domain(settings.domain.clone())
        .max_age(Duration::seconds(settings.max_age_secs))
        .http_only(true)
        .secure(settings.secure)
        .same_site(SameSite::Lax)
        .build()
}

/// Cookie instructing the client to drop the session cookie.
pub fn cleared_cookie(settings: &CookieSettings) -> Cookie<'static> {
    Cookie::build((settings.name.clone(), String::new()))
        .path("/")
        .domain(settings.domain.clone())
        .max_age(Duration::ZERO)
        .http_only(true)
        .secure(settings.secure)
        .same_site(SameSite::Lax)
        .build()
}

/// Token presented by the client: the named cookie, else a bearer header.
pub fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    cookie_value(headers, cookie_name).or_else(|| bearer_token(headers))
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| Cookie::split_parse(raw).filter_map(Result::ok).collect::<Vec<_>>())
        .find(|c| c.name() == name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}
