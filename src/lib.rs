pub mod types;
pub mod error;
pub mod config;
pub mod teams;
pub mod seeding;
pub mod builder;
pub mod linker;
pub mod progression;
pub mod session;
pub mod projection;
pub mod commands;

pub use builder::{generate_bracket, BracketBuilder};
pub use error::{BracketError, BracketResult};
pub use progression::{Advancement, BracketIndex, ProgressionCalculator};
pub use projection::BracketProjection;
pub use session::{BracketSession, BracketSnapshot, ResultOutcome};

use types::*;
use config::*;
use commands::*;

use std::{
    fs,
    sync::{Arc, Mutex},
};
use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, error};
use tracing_subscriber::EnvFilter;

pub fn bracket_router(state: ServerState) -> Router {
    Router::new()
        .route("/api/brackets", post(create_bracket_handler))
        .route("/api/brackets/:bracket_id", get(bracket_snapshot_handler))
        .route("/api/brackets/:bracket_id/projection", get(bracket_projection_handler))
        .route(
            "/api/brackets/:bracket_id/matches/:match_id/advancement",
            get(match_advancement_handler),
        )
        .route("/api/brackets/:bracket_id/matches/:match_id/start", post(start_match_handler))
        .route("/api/brackets/:bracket_id/matches/:match_id/result", post(record_result_handler))
        .route("/api/brackets/:bracket_id/matches/:match_id/reopen", post(reopen_match_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn start_bracket_server(state: ServerState, addr: String) {
    let app = bracket_router(state);
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Bracket server failed to bind {addr}: {e}");
            return;
        }
    };
    info!("Bracket server listening at http://{addr}/");
    if let Err(e) = axum::serve(listener, app).await {
        error!("Bracket server error: {e}");
    }
}

fn load_config() -> AppConfig {
    match load_config_inner() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}, using defaults");
            apply_env_overrides(AppConfig::default())
        }
    }
}

pub fn run() {
    load_env_file();
    let mut config = load_config();

    // Initialize tracing with a daily rolling file
    let logs_dir = logs_dir(&config);
    fs::create_dir_all(&logs_dir).ok();
    let file_appender = tracing_appender::rolling::daily(&logs_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();
    info!("Pickleball bracket service starting");
    log_config_warnings(&config);
    if config.bind_addr.trim().is_empty() {
        config.bind_addr = DEFAULT_BIND_ADDR.to_string();
    }

    let store: SharedBracketStore = Arc::new(Mutex::new(BracketStore::default()));
    let addr = config.bind_addr.clone();
    let state = ServerState {
        store,
        config: Arc::new(config),
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {e}");
            return;
        }
    };
    runtime.block_on(start_bracket_server(state, addr));
}
