use axum::{extract::State, Json};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use crate::{
    constants::{LEADERBOARD_CACHE_KEY, LEADERBOARD_SIZE},
    error::Result,
    models::ApiResponse,
    services::LeaderboardCache,
};

use super::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: i64,
    pub id: i64,
    pub wallet_address: String,
    pub username: Option<String>,
    pub avatar: Option<String>,
    pub score: i64,
    pub games_won: i64,
}

/// GET /api/leaderboard
pub async fn get_leaderboard(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<LeaderboardEntry>>>> {
    if let Some(entries) = cached_leaderboard(&state).await {
        return Ok(Json(ApiResponse::success(entries)));
    }

    let entries = sqlx::query_as::<_, LeaderboardEntry>(
        r#"
        SELECT
            ROW_NUMBER() OVER (ORDER BY score DESC, id ASC) AS rank,
            id,
            wallet_address,
            username,
            avatar,
            score,
            games_won
        FROM users
        ORDER BY score DESC, id ASC
        LIMIT $1
        "#,
    )
    .bind(LEADERBOARD_SIZE)
    .fetch_all(state.db.pool())
    .await?;

    store_leaderboard(&state, &entries).await;
    Ok(Json(ApiResponse::success(entries)))
}

async fn cached_leaderboard(state: &AppState) -> Option<Vec<LeaderboardEntry>> {
    if state.config.leaderboard_cache_ttl_secs == 0 {
        return None;
    }

    let mut conn = state.redis.clone();
    let cached: Option<String> = match conn.get(LEADERBOARD_CACHE_KEY).await {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!("Leaderboard cache read failed: {}", err);
            return None;
        }
    };
    cached.and_then(|raw| serde_json::from_str(&raw).ok())
}

async fn store_leaderboard(state: &AppState, entries: &[LeaderboardEntry]) {
    let ttl = state.config.leaderboard_cache_ttl_secs;
    if ttl == 0 {
        return;
    }

    let Ok(payload) = serde_json::to_string(entries) else {
        return;
    };
    let mut conn = state.redis.clone();
    let result: std::result::Result<(), redis::RedisError> =
        conn.set_ex(LEADERBOARD_CACHE_KEY, payload, ttl).await;
    if let Err(err) = result {
        tracing::warn!("Leaderboard cache write failed: {}", err);
    }
}

/// Drops the cached top list so the next read reflects new scores.
pub async fn invalidate_cache(redis: &redis::aio::ConnectionManager) {
    let mut conn = redis.clone();
    let result: std::result::Result<(), redis::RedisError> = conn.del(LEADERBOARD_CACHE_KEY).await;
    if let Err(err) = result {
        tracing::warn!("Leaderboard cache invalidation failed: {}", err);
    }
}

pub struct RedisLeaderboardCache {
    redis: redis::aio::ConnectionManager,
}

impl RedisLeaderboardCache {
    pub fn new(redis: redis::aio::ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait::async_trait]
impl LeaderboardCache for RedisLeaderboardCache {
    async fn invalidate(&self) {
        invalidate_cache(&self.redis).await;
    }
}
