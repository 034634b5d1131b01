//! Effective handshake target composition

use super::options::ConnectionOptions;
use crate::auth::ResolvedCredentials;
use crate::ws::ConnectTarget;

/// Inject resolved credentials into the caller URL and handshake headers.
///
/// The token goes on the query string when `query_param` is configured and
/// into `<header_key>: Bearer <token>` when `header_key` is; session cookies
/// become one `Cookie` header.
pub fn compose_target(
    url: &str,
    options: &ConnectionOptions,
    credentials: &ResolvedCredentials,
) -> ConnectTarget {
    let mut target = ConnectTarget::new(url);
    target.subprotocols = options.subprotocols.clone();

    if let (Some(token), Some(auth)) = (&credentials.token, &options.auth) {
        if let Some(param) = &auth.query_param {
            let separator = if url.contains('?') { '&' } else { '?' };
            target.url = format!("{}{}{}={}", url, separator, param, token);
        }
        if let Some(header) = &auth.header_key {
            target
                .headers
                .push((header.clone(), format!("Bearer {}", token)));
        }
    }

    if let Some(cookies) = &credentials.cookies {
        if !cookies.is_empty() {
            target
                .headers
                .push(("Cookie".to_string(), cookies.join("; ")));
        }
    }

    target
}
