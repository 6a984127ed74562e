pub mod match_lifecycle;
#[cfg(test)]
pub mod memory_store;
pub mod relay_hub;

pub use match_lifecycle::{GameOverOutcome, JoinOutcome, MatchLifecycle, MatchStore};
pub use relay_hub::{ConnectionId, RelayHub, RelayOutcome};

use std::sync::Arc;

/// Cached leaderboard that must be dropped whenever user scores change.
#[async_trait::async_trait]
pub trait LeaderboardCache: Send + Sync {
    async fn invalidate(&self);
}

/// Everything `/game-ws` and the match endpoints need to drive live matches.
#[derive(Clone)]
pub struct GameRelay {
    pub hub: RelayHub,
    pub lifecycle: Arc<MatchLifecycle>,
    leaderboard: Option<Arc<dyn LeaderboardCache>>,
}

impl GameRelay {
    pub fn new(hub: RelayHub, lifecycle: MatchLifecycle) -> Self {
        Self {
            hub,
            lifecycle: Arc::new(lifecycle),
            leaderboard: None,
        }
    }

    pub fn with_leaderboard_cache(mut self, cache: Arc<dyn LeaderboardCache>) -> Self {
        self.leaderboard = Some(cache);
        self
    }

    /// Called after a completed match has credited its players.
    pub async fn scores_changed(&self) {
        if let Some(cache) = &self.leaderboard {
            cache.invalidate().await;
        }
    }

    /// Pushes the current waiting-match list to every dashboard subscriber.
    pub async fn refresh_dashboards(&self) {
        match self.lifecycle.waiting_matches().await {
            Ok(matches) => self.hub.publish_matches(matches).await,
            Err(e) => tracing::warn!("Dashboard refresh skipped: {}", e),
        }
    }
}
