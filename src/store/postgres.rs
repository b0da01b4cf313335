// src/store/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, types::Json};

use super::{ProgressStore, StoreError};
use crate::models::{
    badge::EarnedBadge,
    leaderboard::LeaderboardEntry,
    progress::{
        CourseInfo, LessonKey, LessonProgress, LessonProgressUpdate, ProgressCounters,
        SessionCounters, UserRecord,
    },
};

/// Shared store for cohort users, backed by the `users`, `lesson_progress`
/// and `leaderboard` tables.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Helper struct for reading the 'users' table.
#[derive(FromRow)]
struct UserRow {
    id: String,
    student_name: Option<String>,
    points: i64,
    total_lessons_completed: i64,
    total_problems_completed: i64,
    badges: Json<Vec<EarnedBadge>>,
    last_updated: DateTime<Utc>,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            user_id: row.id,
            student_name: row.student_name,
            counters: ProgressCounters {
                points: row.points,
                total_lessons_completed: row.total_lessons_completed,
                total_problems_completed: row.total_problems_completed,
            },
            badges: row.badges.0,
            last_updated: Some(row.last_updated),
        }
    }
}

/// Helper struct for reading the 'lesson_progress' table.
#[derive(FromRow)]
struct LessonRow {
    lesson_id: String,
    completed_probs: Json<Vec<String>>,
    mastery: Option<f64>,
    is_completed: bool,
    completed_at: Option<DateTime<Utc>>,
    last_mastery_update: Option<DateTime<Utc>>,
    course_name: String,
    course_id: String,
    course_code: String,
    resource_link_title: String,
    resource_link_id: String,
    activity_specific: bool,
}

impl From<LessonRow> for LessonProgress {
    fn from(row: LessonRow) -> Self {
        Self {
            lesson_id: row.lesson_id,
            completed_probs: row.completed_probs.0,
            mastery: row.mastery,
            is_completed: row.is_completed,
            completed_at: row.completed_at,
            last_mastery_update: row.last_mastery_update,
            course: CourseInfo {
                course_name: row.course_name,
                course_id: row.course_id,
                course_code: row.course_code,
                resource_link_title: row.resource_link_title,
            },
            resource_link_id: row.resource_link_id,
            activity_specific: row.activity_specific,
        }
    }
}

const USER_COLUMNS: &str = "id, student_name, points, total_lessons_completed, \
     total_problems_completed, badges, last_updated";

const LEADERBOARD_COLUMNS: &str =
    "user_id, display_name, points, total_lessons_completed, last_activity, updated_at";

#[async_trait]
impl ProgressStore for PgStore {
    async fn load_user(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserRecord::from))
    }

    async fn ensure_user(
        &self,
        user_id: &str,
        student_name: Option<&str>,
    ) -> Result<UserRecord, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, student_name) VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET
                student_name = COALESCE(EXCLUDED.student_name, users.student_name)
            "#,
        )
        .bind(user_id)
        .bind(student_name)
        .execute(&self.pool)
        .await?;

        self.load_user(user_id)
            .await?
            .ok_or_else(|| StoreError::MissingUser(user_id.to_string()))
    }

    async fn increment_user_counters(
        &self,
        user_id: &str,
        delta: &SessionCounters,
    ) -> Result<(), StoreError> {
        // Upsert so a user whose record vanished still gets the credit.
        sqlx::query(
            r#"
            INSERT INTO users (id, points, total_problems_completed, total_lessons_completed)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                points = users.points + EXCLUDED.points,
                total_problems_completed = users.total_problems_completed + EXCLUDED.total_problems_completed,
                total_lessons_completed = users.total_lessons_completed + EXCLUDED.total_lessons_completed,
                last_updated = NOW()
            "#,
        )
        .bind(user_id)
        .bind(delta.points)
        .bind(delta.problems_completed)
        .bind(delta.lessons_completed)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_badges(&self, user_id: &str, badges: &[EarnedBadge]) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE users SET badges = $2, last_updated = NOW() WHERE id = $1")
                .bind(user_id)
                .bind(Json(badges))
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::MissingUser(user_id.to_string()));
        }
        Ok(())
    }

    async fn load_lesson_progress(
        &self,
        user_id: &str,
        key: &LessonKey,
    ) -> Result<Option<LessonProgress>, StoreError> {
        let row = sqlx::query_as::<_, LessonRow>(
            r#"
            SELECT
                lesson_id, completed_probs, mastery, is_completed, completed_at,
                last_mastery_update, course_name, course_id, course_code,
                resource_link_title, resource_link_id, activity_specific
            FROM lesson_progress
            WHERE user_id = $1 AND progress_id = $2
            "#,
        )
        .bind(user_id)
        .bind(key.document_id())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(LessonProgress::from))
    }

    async fn save_lesson_progress(
        &self,
        user_id: &str,
        key: &LessonKey,
        update: &LessonProgressUpdate,
    ) -> Result<(), StoreError> {
        let mastery = update.mastery.map(|m| m.mastery);
        let is_completed = update.mastery.map(|m| m.is_completed).unwrap_or(false);
        let completed_at = update.mastery.filter(|m| m.is_completed).map(|m| m.at);
        let marked_at = update.mastery.map(|m| m.at);

        // A NULL mastery in the new row means "keep what is stored".
        sqlx::query(
            r#"
            INSERT INTO lesson_progress (
                user_id, progress_id, lesson_id, completed_probs,
                mastery, is_completed, completed_at, last_mastery_update,
                course_name, course_id, course_code, resource_link_title,
                resource_link_id, activity_specific
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (user_id, progress_id) DO UPDATE SET
                completed_probs = EXCLUDED.completed_probs,
                mastery = COALESCE(EXCLUDED.mastery, lesson_progress.mastery),
                is_completed = CASE WHEN EXCLUDED.mastery IS NULL
                    THEN lesson_progress.is_completed ELSE EXCLUDED.is_completed END,
                completed_at = CASE WHEN EXCLUDED.mastery IS NULL
                    THEN lesson_progress.completed_at ELSE EXCLUDED.completed_at END,
                last_mastery_update = COALESCE(EXCLUDED.last_mastery_update, lesson_progress.last_mastery_update),
                course_name = EXCLUDED.course_name,
                course_id = EXCLUDED.course_id,
                course_code = EXCLUDED.course_code,
                resource_link_title = EXCLUDED.resource_link_title,
                resource_link_id = EXCLUDED.resource_link_id,
                activity_specific = EXCLUDED.activity_specific,
                updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(key.document_id())
        .bind(&key.lesson_id)
        .bind(Json(&update.completed_probs))
        .bind(mastery)
        .bind(is_completed)
        .bind(completed_at)
        .bind(marked_at)
        .bind(&update.course.course_name)
        .bind(&update.course.course_id)
        .bind(&update.course.course_code)
        .bind(&update.course.resource_link_title)
        .bind(key.resource_link_id.clone().unwrap_or_default())
        .bind(key.resource_link_id.is_some())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_leaderboard_entry(
        &self,
        user_id: &str,
    ) -> Result<Option<LeaderboardEntry>, StoreError> {
        let entry = sqlx::query_as::<_, LeaderboardEntry>(&format!(
            "SELECT {} FROM leaderboard WHERE user_id = $1",
            LEADERBOARD_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    async fn put_leaderboard_entry(&self, entry: &LeaderboardEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO leaderboard (user_id, display_name, points, total_lessons_completed, last_activity, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id) DO UPDATE SET
                display_name = EXCLUDED.display_name,
                points = EXCLUDED.points,
                total_lessons_completed = EXCLUDED.total_lessons_completed,
                last_activity = EXCLUDED.last_activity,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&entry.user_id)
        .bind(&entry.display_name)
        .bind(entry.points)
        .bind(entry.total_lessons_completed)
        .bind(entry.last_activity)
        .bind(entry.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn top_leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let entries = sqlx::query_as::<_, LeaderboardEntry>(&format!(
            "SELECT {} FROM leaderboard \
             ORDER BY points DESC, total_lessons_completed DESC, user_id ASC \
             LIMIT $1",
            LEADERBOARD_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn increment_leaderboard_lessons(&self, user_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE leaderboard SET
                total_lessons_completed = total_lessons_completed + 1,
                last_activity = NOW(),
                updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::MissingUser(user_id.to_string()));
        }
        Ok(())
    }
}
