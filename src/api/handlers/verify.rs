use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;

use crate::error::AppError;
use crate::services::verify::VerifiedAssertion;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub token: Option<String>,
}

/// `POST /verify`: run the verification pipeline over the submitted
/// assertion. The body is read leniently: anything that is not a JSON
/// object with a `token` string is treated as "no token presented" so the
/// error body stays within the wire contract.
pub async fn verify_assertion(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<VerifiedAssertion>), AppError> {
    let request: VerifyRequest = serde_json::from_slice(&body).unwrap_or_default();
    let token = request.token.unwrap_or_default();

    let verified = state.verifier.verify(token.trim())?;
    Ok((StatusCode::OK, Json(verified)))
}
