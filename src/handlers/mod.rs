//! HTTP handlers.

pub mod admin;
pub mod config;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::error::OnboardError;

impl IntoResponse for OnboardError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Transport { .. } => StatusCode::BAD_GATEWAY,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Process { .. } | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match &self {
            Self::Internal { message } => {
                error!(%message, "internal error");
                "internal server error".to_string()
            },
            other => other.to_string(),
        };

        (status, body).into_response()
    }
}

/// Reject a missing or blank query parameter.
pub(crate) fn required_param(value: Option<String>, name: &str) -> Result<String, OnboardError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(OnboardError::validation(format!("'{name}' is required"))),
    }
}
