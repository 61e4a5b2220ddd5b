use std::sync::Arc;

use crate::services::challenge::ChallengeIssuer;
use crate::services::verify::AssertionVerifier;

#[derive(Clone)]
pub struct AppState {
    pub challenges: Arc<ChallengeIssuer>,
    pub verifier: Arc<AssertionVerifier>,
}

impl AppState {
    pub fn new(challenges: Arc<ChallengeIssuer>, verifier: Arc<AssertionVerifier>) -> Self {
        Self {
            challenges,
            verifier,
        }
    }
}
