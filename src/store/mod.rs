// src/store/mod.rs

//! Persistence behind the points ledger, lesson controller and leaderboard.
//!
//! Two backends exist: [`postgres::PgStore`] for cohort (LMS) users and
//! [`local::LocalStore`], a JSON file standing in for the device storage of
//! standalone users. Both are used through [`ProgressStore`].

pub mod local;
pub mod postgres;

use async_trait::async_trait;

use crate::models::{
    badge::EarnedBadge,
    leaderboard::LeaderboardEntry,
    progress::{LessonKey, LessonProgress, LessonProgressUpdate, SessionCounters, UserRecord},
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("device storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("device storage is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("user '{0}' has no record")]
    MissingUser(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn load_user(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Creates the user with zeroed counters if it does not exist yet and
    /// returns the stored record. A given `student_name` replaces the stored one.
    async fn ensure_user(
        &self,
        user_id: &str,
        student_name: Option<&str>,
    ) -> Result<UserRecord, StoreError>;

    /// Atomically adds the deltas to the persisted counters.
    async fn increment_user_counters(
        &self,
        user_id: &str,
        delta: &SessionCounters,
    ) -> Result<(), StoreError>;

    /// Replaces the stored badge list.
    async fn save_badges(&self, user_id: &str, badges: &[EarnedBadge]) -> Result<(), StoreError>;

    async fn load_lesson_progress(
        &self,
        user_id: &str,
        key: &LessonKey,
    ) -> Result<Option<LessonProgress>, StoreError>;

    async fn save_lesson_progress(
        &self,
        user_id: &str,
        key: &LessonKey,
        update: &LessonProgressUpdate,
    ) -> Result<(), StoreError>;

    async fn load_leaderboard_entry(
        &self,
        user_id: &str,
    ) -> Result<Option<LeaderboardEntry>, StoreError>;

    /// Last-writer-wins write of a full leaderboard row.
    async fn put_leaderboard_entry(&self, entry: &LeaderboardEntry) -> Result<(), StoreError>;

    /// Rows ordered by points desc, lessons desc, user id asc.
    async fn top_leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, StoreError>;

    async fn increment_leaderboard_lessons(&self, user_id: &str) -> Result<(), StoreError>;
}
