//! Credential acquisition
//!
//! Fetches bearer tokens or session cookies over HTTP before a socket
//! handshake. A failed fetch is logged and the connection proceeds
//! unauthenticated.

mod http;
mod resolver;
mod types;

pub use http::{HttpClient, ReqwestHttpClient, DEFAULT_AUTH_TIMEOUT};
pub use resolver::CredentialResolver;
pub use types::{
    AuthConfig, AuthError, AuthMethod, AuthMode, Credential, HttpRequest, HttpResponse,
    ResolvedCredentials,
};
