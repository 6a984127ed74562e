use axum::{extract::State, Json};
use serde::Serialize;

use super::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: String,
    pub redis: String,
    pub live_connections: usize,
    pub joined_connections: usize,
    pub live_matches: usize,
    pub dashboards: usize,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_status = if state.db.pool().acquire().await.is_ok() {
        "connected"
    } else {
        "disconnected"
    };

    let mut conn = state.redis.clone();
    let ping: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
    let redis_status = if ping.is_ok() { "connected" } else { "disconnected" };

    let stats = state.relay.hub.stats().await;

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: db_status.to_string(),
        redis: redis_status.to_string(),
        live_connections: stats.connections,
        joined_connections: stats.joined,
        live_matches: stats.live_matches,
        dashboards: stats.dashboards,
    })
}
