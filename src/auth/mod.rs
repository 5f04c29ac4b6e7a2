use crate::config::AuthConfig;
use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

#[cfg(test)]
mod tests;

/// Extract bearer token from HTTP Authorization header
///
/// Expected format: "Authorization: Bearer <token>"
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, TokenError> {
    let auth_header = headers
        .get("authorization")
        .ok_or(TokenError::Missing)?
        .to_str()
        .map_err(|_| TokenError::InvalidFormat)?;

    parse_bearer_token(auth_header)
}

/// Token for a WebSocket upgrade: `?token=` wins, then the Authorization header.
///
/// Browsers cannot set headers on a WebSocket handshake, hence the query form.
pub fn extract_stream_token(
    headers: &HeaderMap,
    query_token: Option<&str>,
) -> Result<String, TokenError> {
    match query_token {
        Some(token) => {
            let token = token.trim();
            if token.is_empty() {
                Err(TokenError::Empty)
            } else {
                Ok(token.to_string())
            }
        }
        None => extract_bearer_token(headers),
    }
}

fn parse_bearer_token(header_value: &str) -> Result<String, TokenError> {
    let parts: Vec<&str> = header_value.splitn(2, ' ').collect();

    if parts.len() != 2 {
        return Err(TokenError::InvalidFormat);
    }

    if parts[0].to_lowercase() != "bearer" {
        return Err(TokenError::InvalidFormat);
    }

    let token = parts[1].trim();
    if token.is_empty() {
        return Err(TokenError::Empty);
    }

    Ok(token.to_string())
}

/// Token extraction errors
#[derive(Debug, PartialEq, Clone)]
pub enum TokenError {
    /// Authorization header or token parameter not present
    Missing,
    /// Invalid format (not "Bearer <token>")
    InvalidFormat,
    /// Token is empty string
    Empty,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Missing => write!(f, "Authorization token not provided"),
            TokenError::InvalidFormat => write!(f, "Invalid authorization token format"),
            TokenError::Empty => write!(f, "Authorization token is empty"),
        }
    }
}

impl std::error::Error for TokenError {}

/// Outcome of checking a session token with the identity collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// Token is valid and may use the service
    Allowed,
    /// Token is valid but lacks permission
    Forbidden,
    /// Token unknown, expired or malformed
    Rejected,
}

/// Boolean gate onto the external identity service.
///
/// Token issuance lives elsewhere; this crate only asks whether a presented
/// token may proceed.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Verification;
}

/// Verifier backed by a fixed token list from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
    tokens: HashSet<String>,
}

impl StaticTokenVerifier {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Verification {
        if self.tokens.contains(token) {
            Verification::Allowed
        } else {
            Verification::Rejected
        }
    }
}

/// Authorization errors
#[derive(Debug, PartialEq)]
pub enum AuthError {
    /// Missing, malformed or rejected token
    Unauthorized(String),
    /// Valid token without permission
    Forbidden(String),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AuthError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Shared auth switch handed to every router.
///
/// `None` means auth is disabled and every request passes.
#[derive(Clone, Default)]
pub struct AuthGate {
    verifier: Option<Arc<dyn TokenVerifier>>,
}

impl AuthGate {
    pub fn disabled() -> Self {
        Self { verifier: None }
    }

    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self {
            verifier: Some(verifier),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        if config.enabled {
            Self::new(Arc::new(StaticTokenVerifier::new(config.tokens.iter().cloned())))
        } else {
            Self::disabled()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.verifier.is_some()
    }

    /// Check an extracted token against the verifier
    pub async fn authorize(&self, token: Result<String, TokenError>) -> Result<(), AuthError> {
        let Some(verifier) = &self.verifier else {
            return Ok(());
        };

        let token = token.map_err(|e| AuthError::Unauthorized(e.to_string()))?;

        match verifier.verify(&token).await {
            Verification::Allowed => Ok(()),
            Verification::Forbidden => Err(AuthError::Forbidden(
                "Token is not permitted to use this service".to_string(),
            )),
            Verification::Rejected => Err(AuthError::Unauthorized(
                "Invalid or expired token".to_string(),
            )),
        }
    }
}

/// Bearer-token middleware for the proximity and dispatch routes
pub async fn require_auth(State(gate): State<AuthGate>, req: Request, next: Next) -> Response {
    if let Err(e) = gate.authorize(extract_bearer_token(req.headers())).await {
        warn!(path = %req.uri().path(), error = %e, "Request rejected by auth gate");
        return e.into_response();
    }
    next.run(req).await
}
