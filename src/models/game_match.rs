use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ==================== MATCH STATUS ====================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Waiting,
    InProgress,
    Completed,
}

impl MatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "waiting" => Some(Self::Waiting),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl TryFrom<String> for MatchStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("unknown match status: {}", value))
    }
}

// ==================== MATCH ====================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct GameMatch {
    pub id: i64,
    pub player1_id: i64,
    pub player2_id: Option<i64>,
    pub bet_amount: String,
    pub bet_type: String,
    #[sqlx(try_from = "String")]
    pub status: MatchStatus,
    pub winner_id: Option<i64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub game_type: String,
    pub is_practice: bool,
    pub time_limit: Option<i32>,
    pub player1_score: Option<f64>,
    pub player2_score: Option<f64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl GameMatch {
    pub fn has_player(&self, user_id: i64) -> bool {
        self.player1_id == user_id || self.player2_id == Some(user_id)
    }

    pub fn opponent_of(&self, user_id: i64) -> Option<i64> {
        if self.player1_id == user_id {
            self.player2_id
        } else if self.player2_id == Some(user_id) {
            Some(self.player1_id)
        } else {
            None
        }
    }

    pub fn score_of(&self, user_id: i64) -> Option<f64> {
        if self.player1_id == user_id {
            self.player1_score
        } else if self.player2_id == Some(user_id) {
            self.player2_score
        } else {
            None
        }
    }

    /// A waiting match with an open seat that `user_id` is allowed to take.
    pub fn can_be_joined_by(&self, user_id: i64) -> bool {
        self.status == MatchStatus::Waiting
            && self.player2_id.is_none()
            && self.player1_id != user_id
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMatchRequest {
    pub bet_amount: String,
    pub bet_type: Option<String>,
    pub game_type: String,
    #[serde(default)]
    pub is_practice: bool,
    pub time_limit: Option<i32>,
}

/// A validated match creation, ready to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMatch {
    pub bet_amount: String,
    pub bet_type: String,
    pub game_type: String,
    pub is_practice: bool,
    pub time_limit: Option<i32>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchListQuery {
    pub status: Option<String>,
    pub game_type: Option<String>,
}

// ==================== LIVE STATE ====================

/// Latest snapshot a player reported for their board, relayed exactly as
/// received. Games put `board`/`score`/`level` here, or anything else.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerState(pub serde_json::Map<String, serde_json::Value>);

#[cfg(test)]
pub(crate) fn match_fixture(id: i64, player1_id: i64, player2_id: Option<i64>, status: MatchStatus) -> GameMatch {
    GameMatch {
        id,
        player1_id,
        player2_id,
        bet_amount: "0".to_string(),
        bet_type: "xp".to_string(),
        status,
        winner_id: None,
        start_time: None,
        end_time: None,
        game_type: "tetris".to_string(),
        is_practice: false,
        time_limit: None,
        player1_score: None,
        player2_score: None,
        expires_at: None,
        created_at: Utc::now(),
    }
}
