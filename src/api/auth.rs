use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap},
    Json,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{
    constants::SESSION_COOKIE,
    error::{AppError, Result},
    models::{ApiResponse, ConnectUserRequest, User},
};

use super::{profile, require_user, AppState};

// ==================== REQUEST/RESPONSE TYPES ====================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectUserResponse {
    pub user: User,
    pub token: String,
    pub expires_in: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub exp: usize,
    pub iat: usize,
}

// ==================== HANDLERS ====================

/// POST /api/user
pub async fn connect_user(
    State(state): State<AppState>,
    Json(req): Json<ConnectUserRequest>,
) -> Result<([(axum::http::HeaderName, String); 1], Json<ApiResponse<ConnectUserResponse>>)> {
    let wallet = normalize_wallet_address(&req.wallet_address)?;
    let username = req
        .username
        .as_deref()
        .map(profile::normalize_username)
        .transpose()?;
    let avatar = req
        .avatar
        .as_deref()
        .map(profile::normalize_avatar)
        .transpose()?;

    let mut user = state.db.upsert_user(&wallet).await?;
    if username.is_some() || avatar.is_some() {
        user = state
            .db
            .update_profile(user.id, username.as_deref(), avatar.as_deref())
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    }
    tracing::info!("User {} connected ({})", user.id, user.wallet_address);

    let expires_in = state.config.jwt_expiry_hours * 3600;
    let token = generate_session_token(user.id, &state.config.jwt_secret, state.config.jwt_expiry_hours)?;
    let cookie = session_cookie(&token, expires_in, !state.config.is_development());

    Ok((
        [(SET_COOKIE, cookie)],
        Json(ApiResponse::success(ConnectUserResponse {
            user,
            token,
            expires_in,
        })),
    ))
}

/// GET /api/user
pub async fn get_current_user(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<User>>> {
    let user = require_user(&headers, &state).await?;
    Ok(Json(ApiResponse::success(user)))
}

// ==================== HELPER FUNCTIONS ====================

pub fn generate_session_token(user_id: i64, secret: &str, expiry_hours: u64) -> Result<String> {
    let now = Utc::now();
    let expiration = now
        .checked_add_signed(Duration::hours(expiry_hours as i64))
        .ok_or_else(|| AppError::Internal("Token expiry out of range".to_string()))?
        .timestamp();

    let claims = Claims {
        sub: user_id.to_string(),
        exp: expiration as usize,
        iat: now.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Failed to generate token: {}", e)))
}

pub fn extract_user_id_from_token(token: &str, secret: &str) -> Result<i64> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Invalid or expired token".to_string()))?;

    token_data
        .claims
        .sub
        .parse()
        .map_err(|_| AppError::AuthError("Invalid token subject".to_string()))
}

fn session_cookie(token: &str, max_age_secs: u64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, max_age_secs
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `0x` hex addresses are lowercased; other identifiers are kept as given.
fn normalize_wallet_address(raw: &str) -> Result<String> {
    let value = raw.trim();
    if value.len() < 3 || value.len() > 128 {
        return Err(AppError::BadRequest(
            "walletAddress must be 3-128 characters".to_string(),
        ));
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(AppError::BadRequest(
            "walletAddress contains invalid characters".to_string(),
        ));
    }

    if value.starts_with("0x") || value.starts_with("0X") {
        Ok(value.to_ascii_lowercase())
    } else {
        Ok(value.to_string())
    }
}
