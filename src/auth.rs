use chrono::{DateTime, Duration, Utc};
use reqwest::blocking::Client;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::OAuthConfig;
use crate::error::{BookError, Result};

/// A signed-in user's access token. There is no refresh: once it expires
/// the shelf endpoints start rejecting it and the user signs in again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Wrap a token obtained elsewhere. Its lifetime is unknown.
    pub fn from_access_token(token: &str) -> Option<Self> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        Some(Self {
            access_token: token.to_string(),
            expires_at: None,
        })
    }

    pub fn bearer(&self) -> &str {
        &self.access_token
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }

    /// Whole minutes left, if the lifetime is known.
    pub fn minutes_left(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_at.map(|at| (at - now).num_minutes().max(0))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TokenError {
    error: String,
    error_description: Option<String>,
}

impl OAuthConfig {
    pub fn is_configured(&self) -> bool {
        !self.client_id.trim().is_empty()
    }

    /// Consent page for the authorization-code flow.
    pub fn authorization_url(&self, state: &str) -> String {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", self.scope.as_str()),
            ("access_type", "online"),
            ("prompt", "consent"),
            ("state", state),
        ];
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.auth_url, query)
    }
}

/// Trade an authorization code for an access token.
pub fn exchange_code(http: &Client, config: &OAuthConfig, code: &str) -> Result<Session> {
    let code = code.trim();
    if code.is_empty() {
        return Err(BookError::Auth("authorization code is empty".into()));
    }
    if !config.is_configured() {
        return Err(BookError::Config("oauth client_id is not set".into()));
    }

    let mut form = vec![
        ("grant_type", "authorization_code"),
        ("code", code),
        ("client_id", config.client_id.as_str()),
        ("redirect_uri", config.redirect_uri.as_str()),
    ];
    if let Some(secret) = &config.client_secret {
        form.push(("client_secret", secret.as_str()));
    }

    let response = http.post(&config.token_url).form(&form).send()?;
    let status = response.status();
    let text = response.text()?;

    if !status.is_success() {
        let reason = serde_json::from_str::<TokenError>(&text)
            .map(|e| match e.error_description {
                Some(desc) => format!("{}: {}", e.error, desc),
                None => e.error,
            })
            .unwrap_or(text);
        warn!(%status, "token exchange rejected");
        return Err(BookError::Auth(reason));
    }

    let token: TokenResponse = serde_json::from_str(&text)?;
    // out-of-range lifetimes are treated as unknown
    let expires_at = token
        .expires_in
        .and_then(Duration::try_seconds)
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime));
    info!(?expires_at, "signed in");

    Ok(Session {
        access_token: token.access_token,
        expires_at,
    })
}

/// Accepts either the bare authorization code or the whole redirect URL
/// pasted from the browser. A URL must carry the `state` we sent.
pub fn code_from_redirect(input: &str, expected_state: &str) -> Result<String> {
    let input = input.trim();
    if !input.starts_with("http://") && !input.starts_with("https://") {
        return Ok(input.to_string());
    }
    let url = Url::parse(input).map_err(|e| BookError::Auth(format!("unreadable redirect URL: {}", e)))?;

    let mut code = None;
    let mut state = None;
    let mut denied = None;
    for (name, value) in url.query_pairs() {
        match name.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => denied = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(reason) = denied {
        return Err(BookError::Auth(format!("sign-in was refused: {}", reason)));
    }
    if state.as_deref() != Some(expected_state) {
        warn!("redirect state does not match the sign-in request");
        return Err(BookError::Auth("sign-in response does not match this request".into()));
    }
    code.ok_or_else(|| BookError::Auth("redirect URL has no authorization code".into()))
}
