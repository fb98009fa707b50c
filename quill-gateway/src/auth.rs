//! Authentication for Quill Gateway.
//!
//! Sign-in is handled by the external auth provider, which issues HS256 JWTs
//! and stores them in a session cookie. The gateway only validates those
//! tokens with the shared secret. A bearer `Authorization` header is accepted
//! as a fallback for non-browser clients.

use crate::routes::ErrorResponse;
use anyhow::Result;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// JWT claims issued by the auth provider.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
    /// Email address, when the provider includes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Authentication state shared across requests.
#[derive(Clone)]
pub struct AuthState {
    pub jwt_secret: Arc<String>,
    pub cookie_name: Arc<String>,
    pub token_expiry_secs: u64,
}

impl AuthState {
    /// Create a new auth state with the given JWT secret.
    pub fn new(
        jwt_secret: impl Into<String>,
        cookie_name: impl Into<String>,
        token_expiry_secs: u64,
    ) -> Self {
        Self {
            jwt_secret: Arc::new(jwt_secret.into()),
            cookie_name: Arc::new(cookie_name.into()),
            token_expiry_secs,
        }
    }

    /// Mint a provider-compatible token. Used by tests and local tooling.
    pub fn generate_token(&self, user_id: &str, email: Option<&str>) -> Result<String> {
        let now = chrono::Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: user_id.to_string(),
            exp: now + self.token_expiry_secs as usize,
            iat: now,
            email: email.map(str::to_string),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?;

        Ok(token)
    }

    /// Validate a JWT token and return the claims.
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )?;

        if token_data.claims.sub.is_empty() {
            anyhow::bail!("token has an empty subject");
        }

        Ok(token_data.claims)
    }

    /// Pull the session token from the cookie, falling back to a bearer header.
    fn extract_token(&self, request: &Request) -> Option<String> {
        let jar = CookieJar::from_headers(request.headers());
        if let Some(cookie) = jar.get(&self.cookie_name) {
            return Some(cookie.value().to_string());
        }

        request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::to_string)
    }
}

/// User info extracted from authentication.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub email: Option<String>,
}

fn unauthorized(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: message.into(),
            code: "AUTH_REQUIRED".into(),
        }),
    )
}

/// Authentication middleware.
pub async fn auth_middleware(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let Some(token) = auth_state.extract_token(&request) else {
        return Err(unauthorized("Not signed in"));
    };

    match auth_state.validate_token(&token) {
        Ok(claims) => {
            request.extensions_mut().insert(AuthUser {
                user_id: claims.sub,
                email: claims.email,
            });
            Ok(next.run(request).await)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Rejected session token");
            Err(unauthorized("Session expired or invalid"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn auth() -> AuthState {
        AuthState::new("test-secret-key-32-bytes-long!!", "quill-session", 3600)
    }

    #[test]
    fn test_token_roundtrip() {
        let auth = auth();
        let token = auth.generate_token("user123", Some("a@b.co")).unwrap();
        let claims = auth.validate_token(&token).unwrap();
        assert_eq!(claims.sub, "user123");
        assert_eq!(claims.email.as_deref(), Some("a@b.co"));
    }

    #[test]
    fn test_invalid_token() {
        assert!(auth().validate_token("invalid-token").is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let other = AuthState::new("another-secret-entirely-different", "quill-session", 3600);
        let token = other.generate_token("user123", None).unwrap();
        assert!(auth().validate_token(&token).is_err());
    }

    #[test]
    fn test_empty_subject_rejected() {
        let auth = auth();
        let token = auth.generate_token("", None).unwrap();
        assert!(auth.validate_token(&token).is_err());
    }

    #[test]
    fn test_extract_token_prefers_cookie() {
        let auth = auth();
        let request = Request::builder()
            .header(header::COOKIE, "theme=dark; quill-session=from-cookie")
            .header(header::AUTHORIZATION, "Bearer from-header")
            .body(Body::empty())
            .unwrap();
        assert_eq!(auth.extract_token(&request).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn test_extract_token_bearer_fallback() {
        let auth = auth();
        let request = Request::builder()
            .header(header::AUTHORIZATION, "Bearer from-header")
            .body(Body::empty())
            .unwrap();
        assert_eq!(auth.extract_token(&request).as_deref(), Some("from-header"));

        let request = Request::builder()
            .header(header::AUTHORIZATION, "Basic abc")
            .body(Body::empty())
            .unwrap();
        assert!(auth.extract_token(&request).is_none());
    }
}
