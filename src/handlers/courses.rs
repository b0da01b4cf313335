// src/handlers/courses.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;

use crate::{
    error::AppError,
    models::{
        content::{CourseSummary, LessonSummary},
        session::LessonStatus,
    },
    services::catalog::ContentCatalog,
};

/// Course selection screen.
pub async fn list_courses(
    State(catalog): State<Arc<ContentCatalog>>,
) -> Result<impl IntoResponse, AppError> {
    let courses: Vec<CourseSummary> = catalog
        .courses()
        .iter()
        .enumerate()
        .map(|(index, c)| CourseSummary {
            index,
            course_name: c.course_name.clone(),
            lesson_count: c.lessons.len(),
        })
        .collect();

    Ok(Json(json!({
        "status": LessonStatus::CourseSelection,
        "courses": courses,
    })))
}

/// Lesson selection screen for one course.
pub async fn get_course(
    State(catalog): State<Arc<ContentCatalog>>,
    Path(index): Path<usize>,
) -> Result<impl IntoResponse, AppError> {
    let course = catalog
        .course(index)
        .ok_or(AppError::NotFound("Course not found".to_string()))?;

    let lessons: Vec<LessonSummary> = course.lessons.iter().map(LessonSummary::from).collect();

    Ok(Json(json!({
        "status": LessonStatus::LessonSelection,
        "courseName": course.course_name,
        "courseOer": course.course_oer,
        "lessons": lessons,
    })))
}
