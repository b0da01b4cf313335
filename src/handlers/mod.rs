// src/handlers/mod.rs

pub mod auth;
pub mod courses;
pub mod leaderboard;
pub mod profile;
pub mod sessions;
