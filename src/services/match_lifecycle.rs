use std::sync::Arc;

use crate::{
    config::Config,
    error::Result,
    models::{GameMatch, MatchStatus},
};

// ==================== STORE TRAIT ====================

/// Durable match storage as seen by the lifecycle. Every mutating call is
/// guarded by the expected current status and returns `None` when the guard
/// did not hold.
#[async_trait::async_trait]
pub trait MatchStore: Send + Sync {
    async fn find_match(&self, match_id: i64) -> Result<Option<GameMatch>>;

    /// waiting -> in_progress, attaching `player2_id` and stamping the start time.
    async fn promote_match(&self, match_id: i64, player2_id: i64) -> Result<Option<GameMatch>>;

    /// Stores a participant's final score on an in-progress match.
    async fn record_final_score(
        &self,
        match_id: i64,
        user_id: i64,
        score: f64,
    ) -> Result<Option<GameMatch>>;

    /// in_progress -> completed, crediting `award` to the winner in the same unit of work.
    async fn complete_match(
        &self,
        match_id: i64,
        winner_id: Option<i64>,
        award: i64,
    ) -> Result<Option<GameMatch>>;

    async fn waiting_matches(&self) -> Result<Vec<GameMatch>>;
}

// ==================== OUTCOMES ====================

#[derive(Debug, Clone)]
pub enum JoinOutcome {
    UnknownMatch,
    Registered(GameMatch),
    Promoted(GameMatch),
}

#[derive(Debug, Clone)]
pub enum GameOverOutcome {
    Ignored(&'static str),
    AwaitingOpponent,
    Completed(GameMatch),
}

// ==================== LIFECYCLE ====================

pub struct MatchLifecycle {
    store: Arc<dyn MatchStore>,
    win_award: i64,
    require_both_reports: bool,
}

impl MatchLifecycle {
    pub fn new(store: Arc<dyn MatchStore>, win_award: i64, require_both_reports: bool) -> Self {
        Self {
            store,
            win_award,
            require_both_reports,
        }
    }

    pub fn from_config(store: Arc<dyn MatchStore>, config: &Config) -> Self {
        Self::new(
            store,
            config.match_win_award,
            config.match_require_both_reports,
        )
    }

    /// Handles a player announcing themselves on a match.
    pub async fn join(&self, match_id: i64, user_id: i64) -> Result<JoinOutcome> {
        let Some(game_match) = self.store.find_match(match_id).await? else {
            return Ok(JoinOutcome::UnknownMatch);
        };

        if !game_match.can_be_joined_by(user_id) {
            return Ok(JoinOutcome::Registered(game_match));
        }

        match self.store.promote_match(match_id, user_id).await? {
            Some(promoted) => {
                tracing::info!(
                    "Match {} started: player1={} player2={}",
                    promoted.id,
                    promoted.player1_id,
                    user_id
                );
                Ok(JoinOutcome::Promoted(promoted))
            }
            None => {
                // Another join won the seat between the read and the update.
                let current = self.store.find_match(match_id).await?.unwrap_or(game_match);
                Ok(JoinOutcome::Registered(current))
            }
        }
    }

    /// Handles a player reporting the end of their game.
    pub async fn game_over(
        &self,
        match_id: i64,
        user_id: i64,
        final_score: Option<f64>,
    ) -> Result<GameOverOutcome> {
        let Some(mut game_match) = self.store.find_match(match_id).await? else {
            return Ok(GameOverOutcome::Ignored("unknown match"));
        };
        if !game_match.has_player(user_id) {
            return Ok(GameOverOutcome::Ignored("reporter is not a participant"));
        }
        if game_match.status != MatchStatus::InProgress {
            return Ok(GameOverOutcome::Ignored("match is not in progress"));
        }

        if let Some(score) = final_score {
            match self.store.record_final_score(match_id, user_id, score).await? {
                Some(updated) => game_match = updated,
                None => return Ok(GameOverOutcome::Ignored("match is not in progress")),
            }
        }

        let winner_id = if self.require_both_reports {
            match resolve_by_scores(&game_match, user_id) {
                Some(winner) => winner,
                None => return Ok(GameOverOutcome::AwaitingOpponent),
            }
        } else {
            Some(user_id)
        };

        let award = if game_match.is_practice { 0 } else { self.win_award };
        match self.store.complete_match(match_id, winner_id, award).await? {
            Some(completed) => {
                tracing::info!(
                    "Match {} completed: winner={:?} award={}",
                    completed.id,
                    completed.winner_id,
                    award
                );
                Ok(GameOverOutcome::Completed(completed))
            }
            None => Ok(GameOverOutcome::Ignored("match already completed")),
        }
    }

    pub async fn waiting_matches(&self) -> Result<Vec<GameMatch>> {
        self.store.waiting_matches().await
    }
}

/// Compares both reported scores. Outer `None`: a report is still missing.
/// Inner `None`: the scores are level and the match is a draw.
fn resolve_by_scores(game_match: &GameMatch, reporter: i64) -> Option<Option<i64>> {
    let opponent = game_match.opponent_of(reporter)?;
    let mine = game_match.score_of(reporter)?;
    let theirs = game_match.score_of(opponent)?;

    Some(match mine.total_cmp(&theirs) {
        std::cmp::Ordering::Greater => Some(reporter),
        std::cmp::Ordering::Less => Some(opponent),
        std::cmp::Ordering::Equal => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::game_match::match_fixture;
    use crate::services::memory_store::MemoryMatchStore;

    fn lifecycle(store: &Arc<MemoryMatchStore>, require_both_reports: bool) -> MatchLifecycle {
        MatchLifecycle::new(store.clone(), 100, require_both_reports)
    }

    #[tokio::test]
    async fn join_promotes_waiting_match() {
        let store = Arc::new(MemoryMatchStore::default());
        store.insert(match_fixture(1, 1, None, MatchStatus::Waiting));

        let outcome = lifecycle(&store, false).join(1, 2).await.unwrap();
        let JoinOutcome::Promoted(m) = outcome else {
            panic!("expected promotion, got {:?}", outcome);
        };
        assert_eq!(m.status, MatchStatus::InProgress);
        assert_eq!(m.player2_id, Some(2));
        assert!(m.start_time.is_some());
    }

    #[tokio::test]
    async fn creator_join_does_not_promote() {
        let store = Arc::new(MemoryMatchStore::default());
        store.insert(match_fixture(1, 1, None, MatchStatus::Waiting));

        let outcome = lifecycle(&store, false).join(1, 1).await.unwrap();
        assert!(matches!(outcome, JoinOutcome::Registered(ref m) if m.status == MatchStatus::Waiting));
        assert_eq!(store.get(1).unwrap().player2_id, None);
    }

    #[tokio::test]
    async fn third_player_join_leaves_match_alone() {
        let store = Arc::new(MemoryMatchStore::default());
        store.insert(match_fixture(1, 1, Some(2), MatchStatus::InProgress));

        let outcome = lifecycle(&store, false).join(1, 3).await.unwrap();
        assert!(matches!(outcome, JoinOutcome::Registered(_)));
        assert_eq!(store.get(1).unwrap().player2_id, Some(2));
    }

    #[tokio::test]
    async fn join_unknown_match_is_reported() {
        let store = Arc::new(MemoryMatchStore::default());
        let outcome = lifecycle(&store, false).join(99, 2).await.unwrap();
        assert!(matches!(outcome, JoinOutcome::UnknownMatch));
    }

    #[tokio::test]
    async fn game_over_declares_reporter_winner_and_awards_once() {
        let store = Arc::new(MemoryMatchStore::default());
        store.insert(match_fixture(1, 1, None, MatchStatus::Waiting));
        let lifecycle = lifecycle(&store, false);

        lifecycle.join(1, 2).await.unwrap();
        let first = lifecycle.game_over(1, 1, None).await.unwrap();
        let GameOverOutcome::Completed(m) = first else {
            panic!("expected completion, got {:?}", first);
        };
        assert_eq!(m.status, MatchStatus::Completed);
        assert_eq!(m.winner_id, Some(1));
        assert!(m.end_time.is_some());
        assert_eq!(store.user_score(1), 100);

        let second = lifecycle.game_over(1, 1, None).await.unwrap();
        assert!(matches!(second, GameOverOutcome::Ignored(_)));
        let third = lifecycle.game_over(1, 2, None).await.unwrap();
        assert!(matches!(third, GameOverOutcome::Ignored(_)));
        assert_eq!(store.user_score(1), 100);
        assert_eq!(store.user_score(2), 0);
        assert_eq!(store.games_played(1), 1);
        assert_eq!(store.games_played(2), 1);
    }

    #[tokio::test]
    async fn game_over_cannot_skip_in_progress() {
        let store = Arc::new(MemoryMatchStore::default());
        store.insert(match_fixture(1, 1, None, MatchStatus::Waiting));

        let outcome = lifecycle(&store, false).game_over(1, 1, Some(10.0)).await.unwrap();
        assert!(matches!(outcome, GameOverOutcome::Ignored(_)));
        assert_eq!(store.get(1).unwrap().status, MatchStatus::Waiting);
    }

    #[tokio::test]
    async fn game_over_from_outsider_is_ignored() {
        let store = Arc::new(MemoryMatchStore::default());
        store.insert(match_fixture(1, 1, Some(2), MatchStatus::InProgress));

        let outcome = lifecycle(&store, false).game_over(1, 3, None).await.unwrap();
        assert!(matches!(outcome, GameOverOutcome::Ignored(_)));
        assert_eq!(store.get(1).unwrap().status, MatchStatus::InProgress);
    }

    #[tokio::test]
    async fn practice_match_completes_without_award() {
        let store = Arc::new(MemoryMatchStore::default());
        let mut practice = match_fixture(1, 1, Some(2), MatchStatus::InProgress);
        practice.is_practice = true;
        store.insert(practice);

        let outcome = lifecycle(&store, false).game_over(1, 2, None).await.unwrap();
        assert!(matches!(outcome, GameOverOutcome::Completed(ref m) if m.winner_id == Some(2)));
        assert_eq!(store.user_score(2), 0);
        assert_eq!(store.games_won(2), 1);
    }

    #[tokio::test]
    async fn both_reports_policy_waits_then_compares_scores() {
        let store = Arc::new(MemoryMatchStore::default());
        store.insert(match_fixture(1, 1, Some(2), MatchStatus::InProgress));
        let lifecycle = lifecycle(&store, true);

        let first = lifecycle.game_over(1, 1, Some(900.0)).await.unwrap();
        assert!(matches!(first, GameOverOutcome::AwaitingOpponent));
        assert_eq!(store.get(1).unwrap().status, MatchStatus::InProgress);

        let second = lifecycle.game_over(1, 2, Some(1200.5)).await.unwrap();
        let GameOverOutcome::Completed(m) = second else {
            panic!("expected completion, got {:?}", second);
        };
        assert_eq!(m.winner_id, Some(2));
        assert_eq!(m.player1_score, Some(900.0));
        assert_eq!(m.player2_score, Some(1200.5));
        assert_eq!(store.user_score(2), 100);
        assert_eq!(store.user_score(1), 0);
    }

    #[tokio::test]
    async fn both_reports_policy_level_scores_draw() {
        let store = Arc::new(MemoryMatchStore::default());
        store.insert(match_fixture(1, 1, Some(2), MatchStatus::InProgress));
        let lifecycle = lifecycle(&store, true);

        lifecycle.game_over(1, 1, Some(500.25)).await.unwrap();
        let outcome = lifecycle.game_over(1, 2, Some(500.25)).await.unwrap();
        let GameOverOutcome::Completed(m) = outcome else {
            panic!("expected completion, got {:?}", outcome);
        };
        assert_eq!(m.winner_id, None);
        assert_eq!(store.user_score(1), 0);
        assert_eq!(store.user_score(2), 0);
        assert_eq!(store.games_played(1), 1);
    }

    #[tokio::test]
    async fn both_reports_policy_without_score_keeps_waiting() {
        let store = Arc::new(MemoryMatchStore::default());
        store.insert(match_fixture(1, 1, Some(2), MatchStatus::InProgress));

        let outcome = lifecycle(&store, true).game_over(1, 1, None).await.unwrap();
        assert!(matches!(outcome, GameOverOutcome::AwaitingOpponent));
    }

    #[test]
    fn resolve_by_scores_needs_both_reports() {
        let mut m = match_fixture(1, 1, Some(2), MatchStatus::InProgress);
        m.player1_score = Some(10.5);
        assert_eq!(resolve_by_scores(&m, 1), None);
        m.player2_score = Some(10.25);
        assert_eq!(resolve_by_scores(&m, 2), Some(Some(1)));
    }
}
