use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::{Duration, Utc};

use crate::{
    constants::{BET_TYPE_TOKEN, BET_TYPE_XP, MAX_TIME_LIMIT_SECS},
    error::{AppError, Result},
    models::{ApiResponse, CreateMatchRequest, GameMatch, MatchListQuery, MatchStatus, NewMatch},
};

use super::{require_user, AppState};

/// GET /api/matches
pub async fn list_matches(
    State(state): State<AppState>,
    Query(query): Query<MatchListQuery>,
) -> Result<Json<ApiResponse<Vec<GameMatch>>>> {
    let status = match query.status.as_deref() {
        None => MatchStatus::Waiting,
        Some(raw) => MatchStatus::parse(raw)
            .ok_or_else(|| AppError::BadRequest(format!("Unknown match status: {}", raw)))?,
    };
    let game_type = query
        .game_type
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());

    let matches = state.db.list_matches(status, game_type).await?;
    Ok(Json(ApiResponse::success(matches)))
}

/// POST /api/matches
pub async fn create_match(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateMatchRequest>,
) -> Result<Json<ApiResponse<GameMatch>>> {
    let user = require_user(&headers, &state).await?;
    let new_match = validate_new_match(req)?;

    let game_match = state.db.create_match(user.id, &new_match).await?;
    tracing::info!(
        "User {} opened match {} ({}, practice={})",
        user.id,
        game_match.id,
        game_match.game_type,
        game_match.is_practice
    );

    state.relay.refresh_dashboards().await;
    Ok(Json(ApiResponse::success(game_match)))
}

/// GET /api/matches/{id}
pub async fn get_match(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<GameMatch>>> {
    let game_match = state
        .db
        .get_match(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Match {} not found", id)))?;
    Ok(Json(ApiResponse::success(game_match)))
}

fn validate_new_match(req: CreateMatchRequest) -> Result<NewMatch> {
    let game_type = req.game_type.trim().to_string();
    if game_type.is_empty() {
        return Err(AppError::BadRequest("gameType is required".to_string()));
    }

    let bet_type = req
        .bet_type
        .as_deref()
        .map(str::trim)
        .unwrap_or(BET_TYPE_XP)
        .to_ascii_lowercase();
    if bet_type != BET_TYPE_XP && bet_type != BET_TYPE_TOKEN {
        return Err(AppError::BadRequest(format!(
            "betType must be '{}' or '{}'",
            BET_TYPE_XP, BET_TYPE_TOKEN
        )));
    }

    // Practice matches never stake anything.
    let bet_amount = if req.is_practice {
        "0".to_string()
    } else {
        normalize_bet_amount(&req.bet_amount)?
    };

    let expires_at = match req.time_limit {
        None => None,
        Some(secs) if (1..=MAX_TIME_LIMIT_SECS).contains(&secs) => {
            Some(Utc::now() + Duration::seconds(i64::from(secs)))
        }
        Some(_) => {
            return Err(AppError::BadRequest(format!(
                "timeLimit must be between 1 and {} seconds",
                MAX_TIME_LIMIT_SECS
            )))
        }
    };

    Ok(NewMatch {
        bet_amount,
        bet_type,
        game_type,
        is_practice: req.is_practice,
        time_limit: req.time_limit,
        expires_at,
    })
}

fn normalize_bet_amount(raw: &str) -> Result<String> {
    let value = raw.trim();
    match value.parse::<f64>() {
        Ok(amount) if amount.is_finite() && amount >= 0.0 => Ok(value.to_string()),
        _ => Err(AppError::BadRequest(
            "betAmount must be a non-negative number".to_string(),
        )),
    }
}
