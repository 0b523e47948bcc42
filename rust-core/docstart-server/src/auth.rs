// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
//! HTTP Basic authentication for the docstart server.
//!
//! Every route except `/health` requires an `Authorization: Basic` header
//! carrying the cluster administrator credentials. Only a SHA-256 hash of
//! the password is kept in memory.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};

/// Realm advertised in `WWW-Authenticate` challenges.
pub const REALM: &str = "docstart";

/// Credentials accepted by the server.
#[derive(Clone)]
pub struct AuthState {
    inner: Arc<Credentials>,
}

struct Credentials {
    username: String,
    password_hash: String,
}

impl AuthState {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            inner: Arc::new(Credentials {
                username: username.to_string(),
                password_hash: hash_key(password),
            }),
        }
    }

    /// Check a username / password pair.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        username == self.inner.username && hash_key(password) == self.inner.password_hash
    }
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("username", &self.inner.username)
            .finish_non_exhaustive()
    }
}

/// Authentication error response.
#[derive(Debug, Serialize)]
struct AuthError {
    error: String,
    code: u16,
}

/// Axum middleware that rejects requests without valid Basic credentials.
pub async fn auth_middleware(
    State(auth): State<AuthState>,
    request: Request,
    next: Next,
) -> Response {
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let credentials = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_basic);

    match credentials {
        Some((username, password)) if auth.verify(&username, &password) => {
            debug!(user = %username, path = %request.uri().path(), "authenticated");
            next.run(request).await
        }
        Some((username, _)) => {
            warn!(user = %username, "rejected credentials");
            unauthorized("Invalid username or password")
        }
        None => unauthorized("Authentication required. Provide Authorization: Basic credentials"),
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, format!("Basic realm=\"{REALM}\""))],
        Json(AuthError {
            error: message.to_string(),
            code: 401,
        }),
    )
        .into_response()
}

/// Split an `Authorization: Basic <base64>` value into username and password.
fn parse_basic(value: &str) -> Option<(String, String)> {
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = B64.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Hash a secret with SHA-256.
fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_key_deterministic() {
        assert_eq!(hash_key("password"), hash_key("password"));
        assert_ne!(hash_key("password"), hash_key("Password"));
    }

    #[test]
    fn test_parse_basic() {
        // "Administrator:password"
        let parsed = parse_basic("Basic QWRtaW5pc3RyYXRvcjpwYXNzd29yZA==").unwrap();
        assert_eq!(parsed, ("Administrator".to_string(), "password".to_string()));

        // "user:pa:ss" keeps colons in the password
        let parsed = parse_basic("basic dXNlcjpwYTpzcw==").unwrap();
        assert_eq!(parsed.1, "pa:ss");

        assert!(parse_basic("Bearer abc").is_none());
        assert!(parse_basic("Basic bm9jb2xvbg==").is_none()); // "nocolon"
    }

    #[test]
    fn test_parse_basic_rejects_malformed_base64() {
        assert!(parse_basic("Basic YQ=a").is_none());
        assert!(parse_basic("Basic ====").is_none());
        assert!(parse_basic("Basic dXNlcjpw*XNz").is_none());
        assert!(parse_basic("Basic dXNlcjpwYXNz=").is_none());
        // "user:pas" without its padding
        assert!(parse_basic("Basic dXNlcjpwYXM").is_none());
        assert_eq!(
            parse_basic("Basic dXNlcjpwYXNz"),
            Some(("user".to_string(), "pass".to_string()))
        );
    }

    #[test]
    fn test_verify() {
        let auth = AuthState::new("Administrator", "password");
        assert!(auth.verify("Administrator", "password"));
        assert!(!auth.verify("Administrator", "wrong"));
        assert!(!auth.verify("admin", "password"));
    }

    #[test]
    fn test_debug_hides_password() {
        let auth = AuthState::new("Administrator", "s3cret");
        let shown = format!("{auth:?}");
        assert!(!shown.contains("s3cret"));
        assert!(!shown.contains(&hash_key("s3cret")));
    }
}
