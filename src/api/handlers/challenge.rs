use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use crate::error::AppError;
use crate::services::challenge::Challenge;
use crate::state::AppState;

/// `POST /challenge`: mint a single-use nonce for the caller to bind into
/// a signed assertion. No request body.
pub async fn issue_challenge(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<Challenge>), AppError> {
    let challenge = state.challenges.issue()?;
    Ok((StatusCode::OK, Json(challenge)))
}
