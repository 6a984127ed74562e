// src/models/mod.rs
pub mod game_match;
pub mod user;

pub use game_match::{CreateMatchRequest, GameMatch, MatchListQuery, MatchStatus, NewMatch, PlayerState};
pub use user::{AddXpRequest, ApiResponse, ConnectUserRequest, UpdateProfileRequest, User};
