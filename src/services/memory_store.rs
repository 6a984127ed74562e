// In-memory MatchStore used by the lifecycle and relay tests.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;

use crate::{
    error::Result,
    models::{GameMatch, MatchStatus},
    services::match_lifecycle::MatchStore,
};

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    score: i64,
    games_played: i64,
    games_won: i64,
}

#[derive(Default)]
struct Inner {
    matches: HashMap<i64, GameMatch>,
    users: HashMap<i64, Tally>,
}

#[derive(Default)]
pub struct MemoryMatchStore {
    inner: Mutex<Inner>,
}

impl MemoryMatchStore {
    pub fn insert(&self, game_match: GameMatch) {
        let mut inner = self.inner.lock().unwrap();
        inner.matches.insert(game_match.id, game_match);
    }

    pub fn get(&self, match_id: i64) -> Option<GameMatch> {
        self.inner.lock().unwrap().matches.get(&match_id).cloned()
    }

    fn tally(&self, user_id: i64) -> Tally {
        self.inner
            .lock()
            .unwrap()
            .users
            .get(&user_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn user_score(&self, user_id: i64) -> i64 {
        self.tally(user_id).score
    }

    pub fn games_played(&self, user_id: i64) -> i64 {
        self.tally(user_id).games_played
    }

    pub fn games_won(&self, user_id: i64) -> i64 {
        self.tally(user_id).games_won
    }
}

#[async_trait::async_trait]
impl MatchStore for MemoryMatchStore {
    async fn find_match(&self, match_id: i64) -> Result<Option<GameMatch>> {
        Ok(self.get(match_id))
    }

    async fn promote_match(&self, match_id: i64, player2_id: i64) -> Result<Option<GameMatch>> {
        let mut inner = self.inner.lock().unwrap();
        let Some(game_match) = inner.matches.get_mut(&match_id) else {
            return Ok(None);
        };
        if !game_match.can_be_joined_by(player2_id) {
            return Ok(None);
        }
        game_match.status = MatchStatus::InProgress;
        game_match.player2_id = Some(player2_id);
        game_match.start_time = Some(Utc::now());
        Ok(Some(game_match.clone()))
    }

    async fn record_final_score(
        &self,
        match_id: i64,
        user_id: i64,
        score: f64,
    ) -> Result<Option<GameMatch>> {
        let mut inner = self.inner.lock().unwrap();
        let Some(game_match) = inner.matches.get_mut(&match_id) else {
            return Ok(None);
        };
        if game_match.status != MatchStatus::InProgress {
            return Ok(None);
        }
        if game_match.player1_id == user_id {
            game_match.player1_score = Some(score);
        } else if game_match.player2_id == Some(user_id) {
            game_match.player2_score = Some(score);
        }
        Ok(Some(game_match.clone()))
    }

    async fn complete_match(
        &self,
        match_id: i64,
        winner_id: Option<i64>,
        award: i64,
    ) -> Result<Option<GameMatch>> {
        let mut inner = self.inner.lock().unwrap();
        let completed = {
            let Some(game_match) = inner.matches.get_mut(&match_id) else {
                return Ok(None);
            };
            if game_match.status != MatchStatus::InProgress {
                return Ok(None);
            }
            game_match.status = MatchStatus::Completed;
            game_match.winner_id = winner_id;
            game_match.end_time = Some(Utc::now());
            game_match.clone()
        };

        for player in [Some(completed.player1_id), completed.player2_id].into_iter().flatten() {
            inner.users.entry(player).or_default().games_played += 1;
        }
        if let Some(winner) = winner_id {
            let tally = inner.users.entry(winner).or_default();
            tally.games_won += 1;
            tally.score += award;
        }
        Ok(Some(completed))
    }

    async fn waiting_matches(&self) -> Result<Vec<GameMatch>> {
        let inner = self.inner.lock().unwrap();
        let mut waiting: Vec<GameMatch> = inner
            .matches
            .values()
            .filter(|m| m.status == MatchStatus::Waiting)
            .cloned()
            .collect();
        waiting.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(waiting)
    }
}
