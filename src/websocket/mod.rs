pub mod game;
pub mod protocol;
