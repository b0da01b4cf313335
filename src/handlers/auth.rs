// src/handlers/auth.rs

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use uuid::Uuid;

use crate::{
    config::Config,
    error::AppError,
    utils::jwt::{Claims, sign_jwt},
};

/// Issues a token for an anonymous standalone learner.
///
/// LMS learners never come through here: their tokens are minted by the
/// launch middleware.
pub async fn issue_standalone_token(
    State(config): State<Config>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = Uuid::new_v4().to_string();
    let token = sign_jwt(
        Claims::standalone(&user_id),
        &config.jwt_secret,
        config.jwt_expiration,
    )?;

    tracing::info!("Issued standalone token for {}", user_id);
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "token": token,
            "userId": user_id,
        })),
    ))
}
