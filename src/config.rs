use std::env;

use crate::{
    constants::{DEFAULT_DAILY_REWARD_XP, DEFAULT_MATCH_WIN_AWARD},
    utils::parse_flag,
};

#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,
    pub environment: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Redis
    pub redis_url: String,

    // Session
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,

    // Match lifecycle
    pub match_win_award: i64,
    pub match_require_both_reports: bool,

    // Rewards
    pub daily_reward_xp: i64,

    // Rate limiting / caching
    pub rate_limit_xp_per_minute: u32,
    pub leaderboard_cache_ttl_secs: u64,

    // CORS
    pub cors_allowed_origins: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),

            database_url: env::var("DATABASE_URL")?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()?,

            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),

            jwt_secret: env::var("JWT_SECRET")?,
            jwt_expiry_hours: env::var("JWT_EXPIRY_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()?,

            match_win_award: env::var("MATCH_WIN_AWARD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MATCH_WIN_AWARD),
            match_require_both_reports: env::var("MATCH_REQUIRE_BOTH_REPORTS")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),

            daily_reward_xp: env::var("DAILY_REWARD_XP")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_DAILY_REWARD_XP),

            rate_limit_xp_per_minute: env::var("RATE_LIMIT_XP_PER_MINUTE")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
            leaderboard_cache_ttl_secs: env::var("LEADERBOARD_CACHE_TTL_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()?,

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string()),
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_url.trim().is_empty() {
            anyhow::bail!("DATABASE_URL is empty");
        }
        if self.jwt_secret.trim().is_empty() {
            anyhow::bail!("JWT_SECRET is empty");
        }
        if self.jwt_expiry_hours == 0 {
            anyhow::bail!("JWT_EXPIRY_HOURS must be > 0");
        }
        if self.match_win_award < 0 {
            anyhow::bail!("MATCH_WIN_AWARD must not be negative");
        }
        if self.daily_reward_xp < 0 {
            anyhow::bail!("DAILY_REWARD_XP must not be negative");
        }

        if self.jwt_secret.contains("change-me") || self.jwt_secret.contains("super_secret") {
            tracing::warn!("Detected dev credentials in config");
        }

        if self.rate_limit_xp_per_minute == 0 {
            tracing::warn!("RATE_LIMIT_XP_PER_MINUTE is 0; treating it as 1");
        }

        if self.cors_allowed_origins.trim().is_empty() {
            tracing::warn!("CORS_ALLOWED_ORIGINS is empty; requests may be blocked");
        }

        if self.match_require_both_reports {
            tracing::info!("Match outcomes require a final score from both players");
        }

        Ok(())
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development" || self.environment == "local"
    }
}

#[cfg(test)]
pub(crate) fn test_config(database_url: &str) -> Config {
    Config {
        host: "0.0.0.0".to_string(),
        port: 3000,
        environment: "development".to_string(),
        database_url: database_url.to_string(),
        database_max_connections: 1,
        redis_url: "redis://localhost:6379".to_string(),
        jwt_secret: "test_secret".to_string(),
        jwt_expiry_hours: 24,
        match_win_award: DEFAULT_MATCH_WIN_AWARD,
        match_require_both_reports: false,
        daily_reward_xp: DEFAULT_DAILY_REWARD_XP,
        rate_limit_xp_per_minute: 30,
        leaderboard_cache_ttl_secs: 15,
        cors_allowed_origins: "*".to_string(),
    }
}
