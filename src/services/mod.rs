// src/services/mod.rs

pub mod badges;
pub mod catalog;
pub mod leaderboard;
pub mod lesson;
pub mod passback;
pub mod points;
pub mod registry;
