// src/models/mod.rs

pub mod badge;
pub mod content;
pub mod leaderboard;
pub mod progress;
pub mod session;
