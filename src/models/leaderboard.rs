// src/models/leaderboard.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'leaderboard' table: one row per user, merged on update.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub display_name: String,
    pub points: i64,
    pub total_lessons_completed: i64,
    pub last_activity: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update merged into a leaderboard row. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct LeaderboardUpdate {
    pub display_name: Option<String>,
    pub points: Option<i64>,
    pub total_lessons_completed: Option<i64>,
}

/// Query parameters for `GET /api/leaderboard`.
#[derive(Debug, Deserialize)]
pub struct LeaderboardParams {
    pub limit: Option<usize>,
}

/// DTO for `PUT /api/leaderboard/display-name`.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DisplayNameRequest {
    #[validate(length(
        min = 1,
        max = 60,
        message = "Display name length must be between 1 and 60 characters."
    ))]
    pub display_name: String,
}

/// Rank of the caller within the visible leaderboard window.
#[derive(Debug, Serialize)]
pub struct RankResponse {
    /// `None` when the caller is outside the window or not on the leaderboard.
    pub rank: Option<usize>,
    pub window: usize,
}
