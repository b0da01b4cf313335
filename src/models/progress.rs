// src/models/progress.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::badge::{BadgeProgress, EarnedBadge};

/// Counters stored durably for a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressCounters {
    pub points: i64,
    pub total_lessons_completed: i64,
    pub total_problems_completed: i64,
}

impl ProgressCounters {
    pub fn plus(&self, session: &SessionCounters) -> Self {
        Self {
            points: self.points + session.points,
            total_lessons_completed: self.total_lessons_completed + session.lessons_completed,
            total_problems_completed: self.total_problems_completed + session.problems_completed,
        }
    }
}

/// Counters earned in the current session and not yet flushed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCounters {
    pub points: i64,
    pub problems_completed: i64,
    pub lessons_completed: i64,
}

impl SessionCounters {
    pub fn is_zero(&self) -> bool {
        self.points == 0 && self.problems_completed == 0 && self.lessons_completed == 0
    }
}

/// The `users` record: persisted counters plus earned badges.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub user_id: String,
    #[serde(default)]
    pub student_name: Option<String>,
    #[serde(flatten)]
    pub counters: ProgressCounters,
    #[serde(default)]
    pub badges: Vec<EarnedBadge>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl UserRecord {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            last_updated: Some(Utc::now()),
            ..Default::default()
        }
    }
}

/// Identifies a lesson progress document for a user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LessonKey {
    pub lesson_id: String,
    pub resource_link_id: Option<String>,
}

impl LessonKey {
    /// `{lessonId}_{resourceLinkId}` for assignment-linked progress,
    /// `{lessonId}` otherwise.
    pub fn document_id(&self) -> String {
        match &self.resource_link_id {
            Some(link) => format!("{}_{}", self.lesson_id, link),
            None => self.lesson_id.clone(),
        }
    }
}

/// LMS course metadata copied onto each lesson progress document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseInfo {
    #[serde(default)]
    pub course_name: String,
    #[serde(default)]
    pub course_id: String,
    #[serde(default)]
    pub course_code: String,
    #[serde(default)]
    pub resource_link_title: String,
}

/// Stored progress for one lesson attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonProgress {
    pub lesson_id: String,
    #[serde(default)]
    pub completed_probs: Vec<String>,
    #[serde(default)]
    pub mastery: Option<f64>,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_mastery_update: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub course: CourseInfo,
    #[serde(default)]
    pub resource_link_id: String,
    #[serde(default)]
    pub activity_specific: bool,
}

/// Merge written over a lesson progress document.
/// `mastery: None` leaves the stored mastery fields untouched.
#[derive(Debug, Clone)]
pub struct LessonProgressUpdate {
    pub completed_probs: Vec<String>,
    pub mastery: Option<MasteryMark>,
    pub course: CourseInfo,
}

#[derive(Debug, Clone, Copy)]
pub struct MasteryMark {
    pub mastery: f64,
    pub is_completed: bool,
    pub at: DateTime<Utc>,
}

impl LessonProgress {
    pub fn apply(&mut self, key: &LessonKey, update: &LessonProgressUpdate) {
        self.lesson_id = key.lesson_id.clone();
        self.completed_probs = update.completed_probs.clone();
        self.course = update.course.clone();
        self.resource_link_id = key.resource_link_id.clone().unwrap_or_default();
        self.activity_specific = key.resource_link_id.is_some();
        if let Some(mark) = update.mastery {
            self.mastery = Some(mark.mastery);
            self.is_completed = mark.is_completed;
            self.completed_at = mark.is_completed.then_some(mark.at);
            self.last_mastery_update = Some(mark.at);
        }
    }
}

/// Progress snapshot returned to the client.
///
/// `total_*` fields are cumulative (persisted plus session); `session_*`
/// fields are the part not flushed yet.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub total_points: i64,
    pub session_points: i64,
    pub total_problems_completed: i64,
    pub session_problems_completed: i64,
    pub total_lessons_completed: i64,
    pub session_lessons_completed: i64,
    pub badges: Vec<EarnedBadge>,
}

/// Response of `GET /api/me/progress`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub user_id: String,
    #[serde(flatten)]
    pub counters: ProgressCounters,
    pub badges: Vec<EarnedBadge>,
    pub badge_progress: Vec<BadgeProgress>,
    /// Leaderboard rank, cohort users only.
    pub rank: Option<usize>,
}
