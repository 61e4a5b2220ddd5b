use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::services::challenge::ChallengeError;
use crate::services::verify::VerifyError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error("internal server error")]
    Internal,
}

/// Wire error body: `error` carries the stable code, `detail` a human hint.
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::Verify(e) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: e.code(),
                    detail: Some(e.to_string()),
                },
            ),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    error: "internal_error",
                    detail: None,
                },
            ),
        };

        (status, Json(body)).into_response()
    }
}

impl From<ChallengeError> for AppError {
    fn from(e: ChallengeError) -> Self {
        tracing::error!(error = %e, "challenge issuance failed");
        AppError::Internal
    }
}
