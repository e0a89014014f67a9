//! Session verification for the hosted auth provider's access tokens.
//!
//! Tokens are HS256 JWTs with audience `authenticated`. The subject is the
//! user id; the first request of an unknown subject provisions a user row.

use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{AppState, routes::error::ErrorResponse};
use api_types::User;

pub const AUDIENCE: &str = "authenticated";

/// Query parameter carrying the token when headers are unavailable, as with
/// browser WebSocket upgrades.
const TOKEN_QUERY_PARAM: &str = "access_token";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing access token")]
    MissingToken,
    #[error("invalid access token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("access token has no email claim")]
    MissingEmail,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub sub: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    pub aud: String,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
}

pub struct JwtService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtService {
    pub fn new(secret: &SecretString) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[AUDIENCE]);
        validation.set_required_spec_claims(&["exp", "sub", "aud"]);

        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        Ok(decode::<Claims>(token, &self.decoding, &self.validation)?.claims)
    }

    /// Mints a token the way the auth provider does. Used by local tooling
    /// and tests.
    pub fn issue(&self, user_id: Uuid, email: &str, ttl: Duration) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            email: Some(email.to_string()),
            aud: AUDIENCE.to_string(),
            exp: (now + ttl).timestamp(),
            iat: Some(now.timestamp()),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user: User,
}

fn bearer_token(request: &Request) -> Option<String> {
    let from_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    if let Some(token) = from_header {
        return Some(token.to_string());
    }

    request.uri().query().and_then(|query| {
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == TOKEN_QUERY_PARAM)
            .map(|(_, value)| value.to_string())
            .filter(|token| !token.is_empty())
    })
}

/// Verifies the caller's token, provisions its user row and exposes the user
/// to handlers as [`RequestContext`].
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ErrorResponse> {
    let unauthorized = |error: AuthError| {
        tracing::debug!(%error, "rejected request");
        ErrorResponse::new(StatusCode::UNAUTHORIZED, error.to_string())
    };

    let token = bearer_token(&request).ok_or_else(|| unauthorized(AuthError::MissingToken))?;
    let claims = state.jwt().verify(&token).map_err(unauthorized)?;
    let email = claims
        .email
        .as_deref()
        .map(str::to_lowercase)
        .ok_or_else(|| unauthorized(AuthError::MissingEmail))?;

    let user = state
        .gateway()
        .users
        .provision_user(claims.sub, &email)
        .await
        .map_err(|error| {
            tracing::error!(?error, user_id = %claims.sub, "failed to provision user");
            ErrorResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "failed to load user")
        })?;

    utils::sentry::configure_user_scope(&user.id.to_string(), Some(&user.email));
    request.extensions_mut().insert(RequestContext { user });
    Ok(next.run(request).await)
}
