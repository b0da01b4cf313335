// src/models/badge.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A badge as stored on the user record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarnedBadge {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub earned_at: DateTime<Utc>,
}

/// Progress towards a badge the user has not earned yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeProgress {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub current: i64,
    pub target: i64,
}

impl BadgeProgress {
    pub fn percentage(&self) -> f64 {
        if self.target <= 0 {
            return 100.0;
        }
        (self.current as f64 / self.target as f64 * 100.0).min(100.0)
    }
}
