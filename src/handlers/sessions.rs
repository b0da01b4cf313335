// src/handlers/sessions.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    models::session::{AnswerRequest, MasteryPayload, SessionContext, UserMode},
    selection::MasteryState,
    services::{lesson::LessonSession, passback::LinkRequest},
    state::AppState,
};

/// Locks the session if it exists and belongs to the caller.
async fn owned_session(
    state: &AppState,
    ctx: &SessionContext,
    id: Uuid,
) -> Result<OwnedMutexGuard<LessonSession>, AppError> {
    let shared = state
        .sessions
        .get(id)
        .await
        .ok_or(AppError::NotFound("Session not found".to_string()))?;

    let session = shared.lock_owned().await;
    if session.user_id() != ctx.user_id {
        // Someone else's session looks exactly like a missing one.
        return Err(AppError::NotFound("Session not found".to_string()));
    }
    Ok(session)
}

/// Enters a lesson: restores prior progress and picks the first problem.
pub async fn start_session(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Path(lesson_id): Path<String>,
    Json(payload): Json<MasteryPayload>,
) -> Result<impl IntoResponse, AppError> {
    let lesson = state
        .catalog
        .lesson(&lesson_id)
        .cloned()
        .ok_or(AppError::NotFound("Lesson not found".to_string()))?;

    let deps = state.lesson_deps(&ctx);
    let (session, view) =
        LessonSession::start(deps, ctx, lesson, MasteryState::new(payload.mastery)).await;
    state.sessions.insert(session).await;

    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_session(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let mut session = owned_session(&state, &ctx, id).await?;
    Ok(Json(session.snapshot()))
}

pub async fn submit_answer(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let mut session = owned_session(&state, &ctx, id).await?;
    let view = session
        .submit_answer(&payload.step_id, &payload.answer, payload.mastery)
        .await?;
    Ok(Json(view))
}

/// "Next problem": completes the current problem and moves on.
pub async fn next_problem(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Path(id): Path<Uuid>,
    Json(payload): Json<MasteryPayload>,
) -> Result<impl IntoResponse, AppError> {
    let mut session = owned_session(&state, &ctx, id).await?;
    let view = session.complete_problem(payload.mastery).await?;
    Ok(Json(view))
}

/// Leaves the lesson. Anything not persisted yet is dropped.
pub async fn abandon_session(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let mut session = owned_session(&state, &ctx, id).await?;
    let view = session.abandon();
    drop(session);
    state.sessions.remove(id).await;
    Ok(Json(view))
}

/// Links the instructor's LMS assignment to a lesson.
pub async fn link_lesson(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Path(lesson_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let lesson = state
        .catalog
        .lesson(&lesson_id)
        .ok_or(AppError::NotFound("Lesson not found".to_string()))?;

    let (UserMode::LmsLinked { course, .. }, Some(token)) = (&ctx.mode, &ctx.token) else {
        return Err(AppError::BadRequest(
            "Only LMS launches can be linked to a lesson".to_string(),
        ));
    };

    state
        .reporter
        .set_lesson(LinkRequest {
            token,
            lesson,
            course,
        })
        .await?;

    Ok(Json(json!({
        "linked": lesson.id,
        "resourceLinkTitle": course.resource_link_title,
    })))
}
