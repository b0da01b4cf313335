// src/handlers/leaderboard.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    config::LEADERBOARD_RANK_WINDOW,
    error::AppError,
    models::{
        leaderboard::{DisplayNameRequest, LeaderboardParams, RankResponse},
        session::SessionContext,
    },
    services::leaderboard::LeaderboardService,
    state::AppState,
    utils::html::clean_display_name,
};

const DEFAULT_LEADERBOARD_LIMIT: usize = 10;

fn service(state: &AppState, ctx: &SessionContext) -> LeaderboardService {
    LeaderboardService::new(state.remote_store.clone(), ctx)
}

/// Top users by points.
pub async fn get_leaderboard(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Query(params): Query<LeaderboardParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_LEADERBOARD_LIMIT);
    let entries = service(&state, &ctx).get_top_users(limit).await?;
    Ok(Json(entries))
}

pub async fn get_my_rank(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
) -> Result<impl IntoResponse, AppError> {
    let rank = service(&state, &ctx).get_user_rank().await;
    Ok(Json(RankResponse {
        rank,
        window: LEADERBOARD_RANK_WINDOW,
    }))
}

/// Overrides the caller's leaderboard name. A no-op for standalone users.
pub async fn update_display_name(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Json(payload): Json<DisplayNameRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    if clean_display_name(&payload.display_name).is_none() {
        return Err(AppError::BadRequest(
            "Display name has no printable characters".to_string(),
        ));
    }

    service(&state, &ctx)
        .update_display_name(&payload.display_name)
        .await;
    Ok(StatusCode::NO_CONTENT)
}

/// Manual lesson credit by an instructor.
pub async fn credit_lesson(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if !ctx.mode.is_cohort() {
        return Err(AppError::BadRequest(
            "Lesson credit needs an LMS launch".to_string(),
        ));
    }

    state
        .remote_store
        .load_leaderboard_entry(&user_id)
        .await?
        .ok_or(AppError::NotFound("User is not on the leaderboard".to_string()))?;

    let target = SessionContext {
        user_id: user_id.clone(),
        student_name: None,
        mode: ctx.mode.clone(),
        privileged: false,
        token: None,
    };
    service(&state, &target).increment_lessons_completed().await;

    tracing::info!("{} credited a lesson to {}", ctx.user_id, user_id);
    Ok(StatusCode::NO_CONTENT)
}
