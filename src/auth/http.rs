//! HTTP client used to fetch credentials before a handshake

use super::types::{AuthError, AuthMethod, HttpRequest, HttpResponse};
use async_trait::async_trait;
use reqwest::header::SET_COOKIE;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// Default timeout for credential requests
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP capability: one request, a 2xx response or a failure
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, AuthError>;
}

/// reqwest-backed credential client
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Client,
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl ReqwestHttpClient {
    /// Create a client with a request timeout
    pub fn new(timeout: Duration) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Request(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, AuthError> {
        let mut builder = match request.method {
            AuthMethod::Get => {
                let pairs = query_pairs(request.params.as_ref());
                self.client.get(&request.url).query(&pairs)
            }
            AuthMethod::Post => {
                let builder = self.client.post(&request.url);
                match &request.params {
                    Some(params) => builder.json(params),
                    None => builder,
                }
            }
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        let status = response.status();
        let set_cookies: Vec<String> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(String::from)
            .collect();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(AuthError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(HttpResponse {
            status: status.as_u16(),
            body: parse_body(&text),
            set_cookies,
        })
    }
}

/// Flatten a JSON object into query pairs; strings are used unquoted
fn query_pairs(params: Option<&Value>) -> Vec<(String, String)> {
    match params {
        Some(Value::Object(map)) => map
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// JSON body when it parses, otherwise the raw text
fn parse_body(text: &str) -> Value {
    if text.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}
