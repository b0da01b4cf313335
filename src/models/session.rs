// src/models/session.rs

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    badge::EarnedBadge,
    content::PublicProblem,
    progress::{CourseInfo, ProgressSnapshot},
};

/// How the user reached the tutor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserMode {
    /// Anonymous use, progress kept in the device store only.
    Standalone,
    /// Launched from an LMS assignment; progress is tracked in the shared
    /// store and the leaderboard.
    LmsLinked {
        resource_link_id: String,
        course: CourseInfo,
    },
}

impl UserMode {
    pub fn is_cohort(&self) -> bool {
        matches!(self, UserMode::LmsLinked { .. })
    }

    pub fn resource_link_id(&self) -> Option<&str> {
        match self {
            UserMode::Standalone => None,
            UserMode::LmsLinked { resource_link_id, .. } => Some(resource_link_id),
        }
    }

    pub fn course(&self) -> CourseInfo {
        match self {
            UserMode::Standalone => CourseInfo::default(),
            UserMode::LmsLinked { course, .. } => course.clone(),
        }
    }
}

/// Everything a service needs to know about the caller. Built from the
/// verified bearer token and passed explicitly into each service.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub user_id: String,
    pub student_name: Option<String>,
    pub mode: UserMode,
    /// Instructors launching from the LMS to configure an assignment.
    pub privileged: bool,
    /// Raw bearer token, forwarded to the LMS middleware on score passback.
    pub token: Option<String>,
}

impl SessionContext {
    pub fn standalone(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            student_name: None,
            mode: UserMode::Standalone,
            privileged: false,
            token: None,
        }
    }
}

/// Lesson navigation states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LessonStatus {
    CourseSelection,
    LessonSelection,
    Learning,
    Graduated,
    Exhausted,
    /// Left by the learner or reaped. Accepts no further work.
    Abandoned,
}

/// Where the client should navigate next, if anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "view", rename_all = "camelCase")]
pub enum Redirect {
    AssignmentFinished {
        #[serde(rename = "lessonId")]
        lesson_id: String,
    },
}

/// Per-skill mastery as computed by the client's BKT engine.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MasteryPayload {
    #[serde(default)]
    pub mastery: HashMap<String, f64>,
}

/// DTO for `POST /api/sessions/{id}/answer`.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    #[validate(length(min = 1, max = 200))]
    pub step_id: String,
    #[validate(length(max = 500))]
    pub answer: String,
    #[serde(default)]
    pub mastery: HashMap<String, f64>,
}

/// Returned whenever the session moves (start, next problem, finalize).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: Uuid,
    pub lesson_id: String,
    pub status: LessonStatus,
    pub problem: Option<PublicProblem>,
    pub redirect: Option<Redirect>,
    pub mastery: f64,
    pub points_earned: i64,
    pub new_badges: Vec<EarnedBadge>,
    pub progress: ProgressSnapshot,
}

/// Result of checking one step answer.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerView {
    pub correct: bool,
    pub attempt: u32,
    pub problem_solved: bool,
    pub points_earned: i64,
    pub new_badges: Vec<EarnedBadge>,
    pub status: LessonStatus,
    pub redirect: Option<Redirect>,
    pub progress: ProgressSnapshot,
}

/// Result of leaving a session without finishing it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AbandonView {
    pub lost_points: i64,
    pub dropped_mastery: Option<f64>,
}
