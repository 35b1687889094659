//! HTTP Basic authentication for protected routes.
//!
//! When no credentials are configured every request is allowed (dev mode).
//! When they are, the `Authorization: Basic ...` header must match exactly.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;
use tracing::debug;

use crate::server::AppState;
use crate::settings::AuthSettings;

/// Reject requests without valid credentials, if credentials are configured.
pub async fn require_basic_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.settings.auth.as_ref() else {
        return next.run(request).await;
    };

    if credentials_match(request.headers(), expected) {
        next.run(request).await
    } else {
        debug!(path = %request.uri().path(), "rejected unauthenticated request");
        unauthorized()
    }
}

fn credentials_match(headers: &HeaderMap, expected: &AuthSettings) -> bool {
    let Some((user, pass)) = basic_credentials(headers) else {
        return false;
    };
    // Evaluate both so a wrong username costs the same as a wrong password.
    let user_ok = constant_time_eq(user.as_bytes(), expected.username.as_bytes());
    let pass_ok = constant_time_eq(pass.as_bytes(), expected.password.as_bytes());
    user_ok & pass_ok
}

/// Byte comparison whose running time depends only on the lengths.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Decode `Authorization: Basic base64(user:pass)`.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

fn unauthorized() -> Response {
    let mut response = (StatusCode::UNAUTHORIZED, "authentication required").into_response();
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"onboard\""),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    fn expected() -> AuthSettings {
        AuthSettings {
            username: "admin".to_string(),
            password: "p:ss".to_string(),
        }
    }

    #[test]
    fn test_valid_credentials() {
        let encoded = STANDARD.encode("admin:p:ss");
        assert!(credentials_match(&headers(&format!("Basic {encoded}")), &expected()));
    }

    #[test]
    fn test_scheme_is_case_insensitive() {
        let encoded = STANDARD.encode("admin:p:ss");
        assert!(credentials_match(&headers(&format!("basic {encoded}")), &expected()));
    }

    #[test]
    fn test_wrong_password() {
        let encoded = STANDARD.encode("admin:nope");
        assert!(!credentials_match(&headers(&format!("Basic {encoded}")), &expected()));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(constant_time_eq(b"", b""));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret!"));
        assert!(!constant_time_eq(b"", b"x"));
    }

    #[test]
    fn test_wrong_username() {
        let encoded = STANDARD.encode("root:p:ss");
        assert!(!credentials_match(&headers(&format!("Basic {encoded}")), &expected()));
    }

    #[test]
    fn test_bearer_and_garbage_rejected() {
        assert!(!credentials_match(&headers("Bearer abc"), &expected()));
        assert!(!credentials_match(&headers("Basic !!!"), &expected()));
        assert!(!credentials_match(&HeaderMap::new(), &expected()));
    }
}
