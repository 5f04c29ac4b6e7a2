// Dispatch facade: rider-facing trip calls answered by the proximity service

mod client;

pub use client::{ProximityClient, BEST_AVAILABLE_PATH, NEARBY_BUSY_PATH};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

/// Dispatch errors
#[derive(Debug, PartialEq)]
pub enum DispatchError {
    /// Rider request body missing or malformed
    InvalidRequest(String),
    /// Proximity service answered with a non-success status
    Upstream { status: u16, message: String },
    /// Proximity service unreachable or timed out
    Transport(String),
    /// Proximity service answered with an unreadable body
    Decode(String),
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchError::InvalidRequest(msg) => write!(f, "{}", msg),
            DispatchError::Upstream { message, .. } => write!(f, "{}", message),
            DispatchError::Transport(msg) => write!(f, "{}", msg),
            DispatchError::Decode(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for DispatchError {}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = match &self {
            DispatchError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            DispatchError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            DispatchError::Transport(_) | DispatchError::Decode(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
