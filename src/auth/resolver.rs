//! Credential resolution ahead of a socket handshake

use super::http::HttpClient;
use super::types::{AuthConfig, AuthError, AuthMode, Credential, HttpRequest, HttpResponse};
use serde_json::Value;
use std::sync::Arc;

/// Fetches a token or session cookies from an HTTP endpoint.
///
/// Failures never abort a connect attempt: they are logged and resolve to
/// `None`, and the caller proceeds without credentials.
#[derive(Clone)]
pub struct CredentialResolver {
    http: Arc<dyn HttpClient>,
}

impl CredentialResolver {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }

    /// Resolve one credential. Issues at most one request.
    pub async fn resolve(&self, config: Option<&AuthConfig>, mode: AuthMode) -> Option<Credential> {
        let config = config?;
        let url = config.url.as_ref()?;

        let request = HttpRequest {
            method: config.method,
            url: url.clone(),
            headers: config.effective_headers(),
            params: config.params.clone(),
        };

        let result = self
            .http
            .request(request)
            .await
            .and_then(|response| extract(config, mode, response));

        match result {
            Ok(credential) => {
                tracing::info!(auth_url = %url, mode = ?mode, "Credential received");
                Some(credential)
            }
            Err(e) => {
                tracing::warn!(auth_url = %url, mode = ?mode, error = %e, "Credential fetch failed, continuing without it");
                None
            }
        }
    }

    /// Resolve a bearer token
    pub async fn resolve_token(&self, config: Option<&AuthConfig>) -> Option<String> {
        match self.resolve(config, AuthMode::Token).await? {
            Credential::Token(token) => Some(token),
            Credential::Cookies(_) => None,
        }
    }

    /// Resolve session cookies
    pub async fn resolve_session(&self, config: Option<&AuthConfig>) -> Option<Vec<String>> {
        match self.resolve(config, AuthMode::Session).await? {
            Credential::Cookies(cookies) => Some(cookies),
            Credential::Token(_) => None,
        }
    }
}

fn extract(
    config: &AuthConfig,
    mode: AuthMode,
    response: HttpResponse,
) -> Result<Credential, AuthError> {
    match mode {
        AuthMode::Token => {
            let value = match &config.token_path {
                Some(path) => response.body.get(path).cloned().unwrap_or(Value::Null),
                None => response.body,
            };
            token_text(value).map(Credential::Token).ok_or(AuthError::EmptyBody)
        }
        AuthMode::Session => {
            let cookies: Vec<String> = response
                .set_cookies
                .iter()
                .filter_map(|c| cookie_pair(c))
                .collect();
            if cookies.is_empty() {
                Err(AuthError::EmptyBody)
            } else {
                Ok(Credential::Cookies(cookies))
            }
        }
    }
}

/// `name=value` part of a `Set-Cookie` value, without its attributes
fn cookie_pair(set_cookie: &str) -> Option<String> {
    let pair = set_cookie.split(';').next()?.trim();
    pair.contains('=').then(|| pair.to_string())
}

fn token_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}
