use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    config::Config,
    error::Result,
    models::*,
    services::match_lifecycle::MatchStore,
};

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}


impl Database {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        // migrations live at the crate root: ./migrations
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ==================== USER QUERIES ====================
impl Database {
    /// Inserts the wallet on first sighting and returns the stored row either way.
    pub async fn upsert_user(&self, wallet_address: &str) -> Result<User> {
        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (wallet_address) VALUES ($1)
             ON CONFLICT (wallet_address) DO UPDATE SET wallet_address = EXCLUDED.wallet_address
             RETURNING *",
        )
        .bind(wallet_address)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn get_user(&self, id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn update_profile(
        &self,
        id: i64,
        username: Option<&str>,
        avatar: Option<&str>,
    ) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "UPDATE users
             SET username = COALESCE($2, username),
                 avatar   = COALESCE($3, avatar)
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(username)
        .bind(avatar)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// Adds XP, and the same amount to score when `add_score` is set.
    pub async fn add_xp(&self, id: i64, xp: i64, add_score: bool) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "UPDATE users
             SET xp    = xp + $2,
                 score = CASE WHEN $3 THEN score + $2 ELSE score END
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(xp)
        .bind(add_score)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// Grants the reward only if the cooldown has elapsed; `None` means it has not.
    pub async fn claim_daily_reward(
        &self,
        id: i64,
        xp: i64,
        cooldown_hours: i64,
    ) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "UPDATE users
             SET xp = xp + $2,
                 last_daily_reward = NOW()
             WHERE id = $1
               AND (last_daily_reward IS NULL
                    OR last_daily_reward <= NOW() - make_interval(hours => $3::int))
             RETURNING *",
        )
        .bind(id)
        .bind(xp)
        .bind(cooldown_hours as i32)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }
}

// ==================== MATCH QUERIES ====================
impl Database {
    pub async fn create_match(&self, player1_id: i64, new_match: &NewMatch) -> Result<GameMatch> {
        let game_match = sqlx::query_as::<_, GameMatch>(
            r#"
            INSERT INTO game_matches
                (player1_id, bet_amount, bet_type, status, game_type, is_practice, time_limit, expires_at)
            VALUES ($1, $2, $3, 'waiting', $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(player1_id)
        .bind(&new_match.bet_amount)
        .bind(&new_match.bet_type)
        .bind(&new_match.game_type)
        .bind(new_match.is_practice)
        .bind(new_match.time_limit)
        .bind(new_match.expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(game_match)
    }

    pub async fn get_match(&self, id: i64) -> Result<Option<GameMatch>> {
        let game_match = sqlx::query_as::<_, GameMatch>("SELECT * FROM game_matches WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(game_match)
    }

    pub async fn list_matches(
        &self,
        status: MatchStatus,
        game_type: Option<&str>,
    ) -> Result<Vec<GameMatch>> {
        let matches = sqlx::query_as::<_, GameMatch>(
            "SELECT * FROM game_matches
             WHERE status = $1
               AND ($2::text IS NULL OR game_type = $2)
             ORDER BY created_at DESC
             LIMIT 100",
        )
        .bind(status.as_str())
        .bind(game_type)
        .fetch_all(&self.pool)
        .await?;
        Ok(matches)
    }
}

#[async_trait::async_trait]
impl MatchStore for Database {
    async fn find_match(&self, match_id: i64) -> Result<Option<GameMatch>> {
        self.get_match(match_id).await
    }

    async fn promote_match(&self, match_id: i64, player2_id: i64) -> Result<Option<GameMatch>> {
        // The status guard makes concurrent joins promote at most once.
        let game_match = sqlx::query_as::<_, GameMatch>(
            "UPDATE game_matches
             SET status = 'in_progress', player2_id = $2, start_time = NOW()
             WHERE id = $1
               AND status = 'waiting'
               AND player2_id IS NULL
               AND player1_id <> $2
             RETURNING *",
        )
        .bind(match_id)
        .bind(player2_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(game_match)
    }

    async fn record_final_score(
        &self,
        match_id: i64,
        user_id: i64,
        score: f64,
    ) -> Result<Option<GameMatch>> {
        let game_match = sqlx::query_as::<_, GameMatch>(
            "UPDATE game_matches
             SET player1_score = CASE WHEN player1_id = $2 THEN $3 ELSE player1_score END,
                 player2_score = CASE WHEN player2_id = $2 THEN $3 ELSE player2_score END
             WHERE id = $1 AND status = 'in_progress'
             RETURNING *",
        )
        .bind(match_id)
        .bind(user_id)
        .bind(score)
        .fetch_optional(&self.pool)
        .await?;
        Ok(game_match)
    }

    async fn complete_match(
        &self,
        match_id: i64,
        winner_id: Option<i64>,
        award: i64,
    ) -> Result<Option<GameMatch>> {
        let mut tx = self.pool.begin().await?;

        let completed = sqlx::query_as::<_, GameMatch>(
            "UPDATE game_matches
             SET status = 'completed', winner_id = $2, end_time = NOW()
             WHERE id = $1 AND status = 'in_progress'
             RETURNING *",
        )
        .bind(match_id)
        .bind(winner_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(game_match) = completed else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query("UPDATE users SET games_played = games_played + 1 WHERE id = $1 OR id = $2")
            .bind(game_match.player1_id)
            .bind(game_match.player2_id)
            .execute(&mut *tx)
            .await?;

        if let Some(winner) = winner_id {
            sqlx::query(
                "UPDATE users SET games_won = games_won + 1, score = score + $2 WHERE id = $1",
            )
            .bind(winner)
            .bind(award)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Some(game_match))
    }

    async fn waiting_matches(&self) -> Result<Vec<GameMatch>> {
        self.list_matches(MatchStatus::Waiting, None).await
    }
}
