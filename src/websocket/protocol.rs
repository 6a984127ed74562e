use serde::{Deserialize, Serialize};

use crate::models::{GameMatch, PlayerState};

/// Messages accepted on `/game-ws`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    Join {
        match_id: i64,
        user_id: i64,
    },
    GameState {
        match_id: i64,
        user_id: i64,
        state: PlayerState,
        #[serde(default)]
        seq: Option<u64>,
    },
    GameOver {
        match_id: i64,
        user_id: i64,
        #[serde(default)]
        final_score: Option<f64>,
    },
    Dashboard {
        user_id: i64,
    },
}

/// Messages pushed to `/game-ws` clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Every known player's latest state, as `[userId, state]` pairs.
    GameState { states: Vec<(i64, PlayerState)> },
    ActiveMatches { matches: Vec<GameMatch> },
    MatchStarted {
        match_id: i64,
        player1_id: i64,
        player2_id: i64,
    },
    MatchEnded {
        match_id: i64,
        winner_id: Option<i64>,
    },
}
