// src/handlers/profile.rs

use axum::{Extension, Json, extract::State, response::IntoResponse};

use crate::{
    error::AppError,
    models::{
        progress::{ProfileResponse, UserRecord},
        session::SessionContext,
    },
    services::{badges, leaderboard::LeaderboardService},
    state::AppState,
};

/// Persisted totals, badges and badge progress of the caller.
pub async fn get_my_progress(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
) -> Result<impl IntoResponse, AppError> {
    let store = state.store_for(&ctx);
    let record = store
        .load_user(&ctx.user_id)
        .await?
        .unwrap_or_else(|| UserRecord::new(&ctx.user_id));

    let rank = LeaderboardService::new(store, &ctx).get_user_rank().await;

    Ok(Json(ProfileResponse {
        user_id: record.user_id,
        counters: record.counters,
        badge_progress: badges::progress(&record.counters, &record.badges),
        badges: record.badges,
        rank,
    }))
}
