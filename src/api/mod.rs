pub mod auth;
pub mod health;
pub mod leaderboard;
pub mod matches;
pub mod profile;

use axum::http::{header::AUTHORIZATION, HeaderMap};

use crate::config::Config;
use crate::constants::SESSION_COOKIE;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::User;
use crate::services::GameRelay;
use crate::utils::cookie_value;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub redis: redis::aio::ConnectionManager,
    pub config: Config,
    pub relay: GameRelay,
}

/// Resolves the caller from a `Bearer` token, falling back to the session cookie.
pub async fn require_user(headers: &HeaderMap, state: &AppState) -> Result<User> {
    let token = session_token(headers)
        .ok_or_else(|| AppError::AuthError("Missing session".to_string()))?;

    let user_id = auth::extract_user_id_from_token(&token, &state.config.jwt_secret)?;
    state
        .db
        .get_user(user_id)
        .await?
        .ok_or_else(|| AppError::AuthError("Unknown user".to_string()))
}

fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty());

    bearer.or_else(|| cookie_value(headers, SESSION_COOKIE))
}
