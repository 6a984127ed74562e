use axum::http::HeaderValue;
use axum::{
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod constants;
mod db;
mod error;
mod models;
mod services;
mod utils;
mod websocket;

use config::Config;
use constants::{API_VERSION, HUB_COMMAND_BUFFER};
use db::Database;
use services::{GameRelay, MatchLifecycle, RelayHub};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arcade_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    config.validate()?;

    tracing::info!("Starting arcade backend");
    tracing::info!("Environment: {}", config.environment);
    tracing::info!("API Version: {}", API_VERSION);

    // Initialize database
    let db = Database::new(&config).await?;

    tracing::info!("Running database migrations...");
    db.run_migrations().await?;

    // Initialize Redis
    let redis = redis::Client::open(config.redis_url.clone())?;
    let redis_manager = redis::aio::ConnectionManager::new(redis).await?;

    // Live match relay
    let lifecycle = MatchLifecycle::from_config(Arc::new(db.clone()), &config);
    let relay = GameRelay::new(RelayHub::spawn(HUB_COMMAND_BUFFER), lifecycle)
        .with_leaderboard_cache(Arc::new(api::leaderboard::RedisLeaderboardCache::new(
            redis_manager.clone(),
        )));
    tracing::info!(
        "Match relay ready (win award {}, both reports required: {})",
        config.match_win_award,
        config.match_require_both_reports
    );

    let app_state = api::AppState {
        db,
        redis: redis_manager,
        config: config.clone(),
        relay,
    };

    let app = build_router(app_state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: api::AppState) -> Router {
    let cors = cors_from_config(&state.config);

    Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        // Users
        .route(
            "/api/user",
            post(api::auth::connect_user).get(api::auth::get_current_user),
        )
        .route("/api/user/profile", put(api::profile::update_profile))
        .route("/api/user/xp", post(api::profile::add_xp))
        .route(
            "/api/user/daily-reward",
            post(api::profile::claim_daily_reward),
        )
        // Matches
        .route(
            "/api/matches",
            get(api::matches::list_matches).post(api::matches::create_match),
        )
        .route("/api/matches/{id}", get(api::matches::get_match))
        // Leaderboard
        .route("/api/leaderboard", get(api::leaderboard::get_leaderboard))
        // WebSocket endpoints
        .route("/game-ws", get(websocket::game::handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_from_config(config: &Config) -> CorsLayer {
    let raw = config.cors_allowed_origins.trim();
    if raw.is_empty() || raw == "*" {
        return CorsLayer::very_permissive();
    }

    let allowed: Vec<HeaderValue> = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<HeaderValue>().ok())
        .collect();

    if allowed.is_empty() {
        tracing::warn!("No valid CORS origins parsed; falling back to permissive");
        return CorsLayer::very_permissive();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

