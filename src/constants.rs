/// Application constants

// API version
pub const API_VERSION: &str = "v1";

// WebSocket configuration
pub const WS_HEARTBEAT_INTERVAL_SECS: u64 = 30;
pub const WS_CLIENT_TIMEOUT_SECS: u64 = 60;
pub const HUB_COMMAND_BUFFER: usize = 1024;

// Match lifecycle
pub const DEFAULT_MATCH_WIN_AWARD: i64 = 100;
pub const BET_TYPE_XP: &str = "xp";
pub const BET_TYPE_TOKEN: &str = "token";
pub const MAX_TIME_LIMIT_SECS: i32 = 3600;

// Rewards
pub const DEFAULT_DAILY_REWARD_XP: i64 = 50;
pub const DAILY_REWARD_COOLDOWN_HOURS: i64 = 24;
pub const MAX_XP_PER_GRANT: i64 = 10_000;
pub const XP_RATE_LIMIT_WINDOW_SECS: i64 = 60;

// Leaderboard
pub const LEADERBOARD_SIZE: i64 = 10;
pub const LEADERBOARD_CACHE_KEY: &str = "arcade:leaderboard:top";

// Session
pub const SESSION_COOKIE: &str = "session";
