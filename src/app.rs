use std::{panic, process, sync::Arc, time::Duration};

use anyhow::Result;
use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::config::Config;
use crate::services::challenge::ChallengeIssuer;
use crate::services::clock::{Clock, SystemClock};
use crate::services::nonce::{InMemoryNonceStore, NonceStore};
use crate::services::verify::{AssertionVerifier, VerifyPolicy};
use crate::state::AppState;

fn init_tracing() {
    // Prefer RUST_LOG if set; otherwise use a sensible default.
    // Ex:
    // RUST_LOG=info,pop_verifier=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    // Keep the default hook as a fallback (prints to stderr with location/payload).
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        // Always surface panics via tracing so they don't get "lost"
        // (stderr can be hidden depending on how the process is launched.)
        tracing::error!(?info, "panic");

        // In development, fail fast: crash the whole process so we notice immediately.
        // In production, prefer the default behavior (stderr) and let the server keep running.
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env()?;

    let abort_on_panic = !config.app_env.is_production();
    init_panic_hook(abort_on_panic);

    tracing::info!(
        "starting verifier in {:?} mode on {}",
        config.app_env,
        config.addr
    );

    let state = build_state(&config);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Wire up process-level services and inject them into the shared state.
///
/// Spawns the background sweep that bounds nonce-store memory; used records
/// are kept until `expires_at + skew` so replays stay detectable.
pub fn build_state(config: &Config) -> AppState {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(InMemoryNonceStore::new());

    spawn_nonce_sweeper(store.clone(), clock.clone(), config.clock_skew_seconds);

    let shared: Arc<dyn NonceStore> = store;

    let challenges = ChallengeIssuer::new(
        shared.clone(),
        clock.clone(),
        config.nonce_ttl_seconds,
        config.audience.clone(),
    );

    let policy = VerifyPolicy {
        audience: config.audience.clone(),
        method: config.verify_method.clone(),
        path: config.verify_path.clone(),
        skew_seconds: config.clock_skew_seconds.min(i64::MAX as u64) as i64,
    };
    let verifier = AssertionVerifier::new(policy, shared, clock);

    AppState::new(Arc::new(challenges), Arc::new(verifier))
}

pub fn build_router(state: AppState) -> Router {
    async fn health() -> &'static str {
        "ok"
    }

    Router::new()
        .route("/health", get(health))
        .merge(api::routes::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

fn spawn_nonce_sweeper(
    store: Arc<InMemoryNonceStore>,
    clock: Arc<dyn Clock>,
    grace_seconds: u64,
) {
    let grace = chrono::Duration::seconds(grace_seconds.min(i64::MAX as u64) as i64);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            let removed = store.sweep_expired(clock.now_utc(), grace);
            if removed > 0 {
                tracing::debug!(removed, "reaped expired nonces");
            }
        }
    });
}
