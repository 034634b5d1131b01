//! Credential configuration and HTTP exchange types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// HTTP method used for the credential request
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthMethod {
    Get,
    #[default]
    Post,
}

/// How to fetch a credential and where to place it on the handshake
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct AuthConfig {
    /// Credential endpoint; without it no request is made
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub method: AuthMethod,
    /// Request headers; defaults to `Content-Type: application/json`
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    /// Query pairs for GET, JSON body for POST
    #[serde(default)]
    pub params: Option<Value>,
    /// Top-level key of the token in the response body
    #[serde(default)]
    pub token_path: Option<String>,
    /// Append `query_param=<token>` to the socket URL
    #[serde(default)]
    pub query_param: Option<String>,
    /// Send `<header_key>: Bearer <token>` on the handshake
    #[serde(default)]
    pub header_key: Option<String>,
}

impl AuthConfig {
    /// Config targeting the given credential endpoint
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn method(mut self, method: AuthMethod) -> Self {
        self.method = method;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn token_path(mut self, path: impl Into<String>) -> Self {
        self.token_path = Some(path.into());
        self
    }

    pub fn query_param(mut self, name: impl Into<String>) -> Self {
        self.query_param = Some(name.into());
        self
    }

    pub fn header_key(mut self, name: impl Into<String>) -> Self {
        self.header_key = Some(name.into());
        self
    }

    /// Configured headers, or the JSON content type when none are set
    pub fn effective_headers(&self) -> HashMap<String, String> {
        match &self.headers {
            Some(headers) => headers.clone(),
            None => HashMap::from([("Content-Type".to_string(), "application/json".to_string())]),
        }
    }
}

/// Which part of the response carries the credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Bearer token in the response body
    Token,
    /// Session cookies in `Set-Cookie` headers
    Session,
}

/// A resolved credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Token(String),
    Cookies(Vec<String>),
}

/// Outcome of the resolving phase of one connect attempt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedCredentials {
    pub token: Option<String>,
    pub cookies: Option<Vec<String>>,
}

/// Outgoing credential request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: AuthMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub params: Option<Value>,
}

/// Successful (2xx) credential response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    /// Parsed JSON, or the raw text as a JSON string
    pub body: Value,
    pub set_cookies: Vec<String>,
}

impl HttpResponse {
    /// 200 response with a JSON body
    pub fn json(body: Value) -> Self {
        Self {
            status: 200,
            body,
            set_cookies: Vec::new(),
        }
    }

    /// 200 response with an empty body and the given cookies
    pub fn with_cookies(cookies: Vec<String>) -> Self {
        Self {
            status: 200,
            body: Value::Null,
            set_cookies: cookies,
        }
    }
}

/// Credential fetch failures; always recovered by the resolver
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Network or client failure
    #[error("Auth request failed: {0}")]
    Request(String),
    /// Non-2xx status
    #[error("Auth endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    /// Response had no usable credential
    #[error("Auth response carried no credential")]
    EmptyBody,
}
