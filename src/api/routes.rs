use axum::{Router, routing::post};

use crate::api::handlers::challenge::issue_challenge;
use crate::api::handlers::verify::verify_assertion;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/challenge", post(issue_challenge))
        .route("/verify", post(verify_assertion))
}
