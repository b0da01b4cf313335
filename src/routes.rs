// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{auth, courses, leaderboard, profile, sessions},
    state::AppState,
    utils::jwt::{auth_middleware, privileged_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, courses, lessons, sessions, leaderboard).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state.
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_routes = Router::new().route("/standalone", post(auth::issue_standalone_token));

    let course_routes = Router::new()
        .route("/", get(courses::list_courses))
        .route("/{index}", get(courses::get_course));

    let lesson_routes = Router::new()
        .route("/{lesson_id}/sessions", post(sessions::start_session))
        // Instructor only: auth first, then the privilege check
        .merge(
            Router::new()
                .route("/{lesson_id}/link", post(sessions::link_lesson))
                .layer(middleware::from_fn(privileged_middleware)),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let session_routes = Router::new()
        .route(
            "/{id}",
            get(sessions::get_session).delete(sessions::abandon_session),
        )
        .route("/{id}/answer", post(sessions::submit_answer))
        .route("/{id}/next", post(sessions::next_problem))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let me_routes = Router::new()
        .route("/progress", get(profile::get_my_progress))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let leaderboard_routes = Router::new()
        .route("/", get(leaderboard::get_leaderboard))
        .route("/rank", get(leaderboard::get_my_rank))
        .route("/display-name", put(leaderboard::update_display_name))
        .merge(
            Router::new()
                .route("/{user_id}/lessons", post(leaderboard::credit_lesson))
                .layer(middleware::from_fn(privileged_middleware)),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/courses", course_routes)
        .nest("/api/lessons", lesson_routes)
        .nest("/api/sessions", session_routes)
        .nest("/api/me", me_routes)
        .nest("/api/leaderboard", leaderboard_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
