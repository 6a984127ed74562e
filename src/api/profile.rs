use axum::{extract::State, http::HeaderMap, Json};
use redis::AsyncCommands;

use crate::{
    constants::{DAILY_REWARD_COOLDOWN_HOURS, MAX_XP_PER_GRANT, XP_RATE_LIMIT_WINDOW_SECS},
    error::{AppError, Result},
    models::{AddXpRequest, ApiResponse, UpdateProfileRequest, User},
};

use super::{leaderboard, require_user, AppState};

const MAX_AVATAR_LEN: usize = 512;

/// PUT /api/user/profile
pub async fn update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<ApiResponse<User>>> {
    let user = require_user(&headers, &state).await?;
    let username = req.username.as_deref().map(normalize_username).transpose()?;
    let avatar = req.avatar.as_deref().map(normalize_avatar).transpose()?;

    if username.is_none() && avatar.is_none() {
        return Ok(Json(ApiResponse::success(user)));
    }

    let user = state
        .db
        .update_profile(user.id, username.as_deref(), avatar.as_deref())
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(ApiResponse::success(user)))
}

/// POST /api/user/xp
pub async fn add_xp(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AddXpRequest>,
) -> Result<Json<ApiResponse<User>>> {
    let user = require_user(&headers, &state).await?;
    if req.xp < 1 || req.xp > MAX_XP_PER_GRANT {
        return Err(AppError::BadRequest(format!(
            "xp must be between 1 and {}",
            MAX_XP_PER_GRANT
        )));
    }

    enforce_xp_rate_limit(&state, user.id).await?;

    // Practice grants level the player up without touching the leaderboard.
    let user = state
        .db
        .add_xp(user.id, req.xp, !req.is_practice)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    if !req.is_practice {
        leaderboard::invalidate_cache(&state.redis).await;
    }

    Ok(Json(ApiResponse::success(user)))
}

/// POST /api/user/daily-reward
pub async fn claim_daily_reward(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<User>>> {
    let user = require_user(&headers, &state).await?;
    let user = state
        .db
        .claim_daily_reward(user.id, state.config.daily_reward_xp, DAILY_REWARD_COOLDOWN_HOURS)
        .await?
        .ok_or(AppError::RewardCooldown)?;

    tracing::info!("User {} claimed daily reward", user.id);
    Ok(Json(ApiResponse::success(user)))
}

// Fixed-window counter per user. Redis failures skip the check.
async fn enforce_xp_rate_limit(state: &AppState, user_id: i64) -> Result<()> {
    let limit = i64::from(state.config.rate_limit_xp_per_minute.max(1));
    let bucket = chrono::Utc::now().timestamp() / XP_RATE_LIMIT_WINDOW_SECS;
    let key = format!("arcade:rl:xp:{}:{}", user_id, bucket);

    let mut conn = state.redis.clone();
    let count: i64 = match conn.incr(&key, 1_i64).await {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!("XP rate limiter skipped (incr failed): {}", err);
            return Ok(());
        }
    };
    if count == 1 {
        let _: std::result::Result<bool, redis::RedisError> =
            conn.expire(&key, XP_RATE_LIMIT_WINDOW_SECS).await;
    }

    if count > limit {
        tracing::warn!("XP rate limit exceeded user={} count={}", user_id, count);
        return Err(AppError::RateLimitExceeded);
    }
    Ok(())
}

pub(crate) fn normalize_username(raw: &str) -> Result<String> {
    let value = raw.trim();
    let len = value.chars().count();
    if !(3..=24).contains(&len) {
        return Err(AppError::BadRequest(
            "username must be 3-24 characters".to_string(),
        ));
    }
    if value.chars().any(char::is_control) {
        return Err(AppError::BadRequest(
            "username contains invalid characters".to_string(),
        ));
    }
    Ok(value.to_string())
}

pub(crate) fn normalize_avatar(raw: &str) -> Result<String> {
    let value = raw.trim();
    if value.is_empty() || value.len() > MAX_AVATAR_LEN {
        return Err(AppError::BadRequest(format!(
            "avatar must be 1-{} characters",
            MAX_AVATAR_LEN
        )));
    }
    Ok(value.to_string())
}
