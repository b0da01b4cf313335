// src/utils/jwt.rs

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    error::AppError,
    models::{
        progress::CourseInfo,
        session::{SessionContext, UserMode},
    },
};

/// JWT Claims structure.
///
/// Standalone tokens are issued by this service; LMS tokens are minted by the
/// launch middleware with the same secret and carry the assignment fields.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// Subject - the user id.
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Present only for LMS launches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_link_id: Option<String>,
    #[serde(default)]
    pub course: CourseInfo,
    /// Instructor launch.
    #[serde(default)]
    pub privileged: bool,
    /// Expiration time as Unix timestamp.
    pub exp: usize,
}

impl Claims {
    pub fn standalone(user_id: &str) -> Self {
        Self {
            sub: user_id.to_string(),
            name: None,
            resource_link_id: None,
            course: CourseInfo::default(),
            privileged: false,
            exp: 0,
        }
    }

    pub fn lms(user_id: &str, name: &str, resource_link_id: &str, course: CourseInfo) -> Self {
        Self {
            sub: user_id.to_string(),
            name: Some(name.to_string()),
            resource_link_id: Some(resource_link_id.to_string()),
            course,
            privileged: false,
            exp: 0,
        }
    }

    /// The caller as seen by the services. Only LMS sessions keep the raw
    /// token, for score passback.
    pub fn into_context(self, token: &str) -> SessionContext {
        let (mode, token) = match self.resource_link_id {
            Some(resource_link_id) => (
                UserMode::LmsLinked {
                    resource_link_id,
                    course: self.course,
                },
                Some(token.to_string()),
            ),
            None => (UserMode::Standalone, None),
        };

        SessionContext {
            user_id: self.sub,
            student_name: self.name,
            mode,
            privileged: self.privileged,
            token,
        }
    }
}

/// Signs `claims`, setting the expiration to now + `expiration_seconds`.
pub fn sign_jwt(
    mut claims: Claims,
    secret: &str,
    expiration_seconds: u64,
) -> Result<String, AppError> {
    claims.exp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .as_secs() as usize
        + expiration_seconds as usize;

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Verifies and decodes a JWT string.
///
/// Returns the `Claims` if valid, otherwise returns an `AppError`.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Invalid token".to_string()))?;

    Ok(token_data.claims)
}

/// Axum Middleware: Authentication.
///
/// Validates the 'Authorization: Bearer <token>' header and injects the
/// caller's `SessionContext` into the request extensions.
pub async fn auth_middleware(
    State(config): State<Config>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let token = match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) => token.to_string(),
        None => return Err(StatusCode::UNAUTHORIZED),
    };

    match verify_jwt(&token, &config.jwt_secret) {
        Ok(claims) => {
            req.extensions_mut().insert(claims.into_context(&token));
            Ok(next.run(req).await)
        }
        Err(_) => Err(StatusCode::UNAUTHORIZED),
    }
}

/// Axum Middleware: instructor-only routes.
///
/// Must be used AFTER `auth_middleware`.
pub async fn privileged_middleware(req: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    let ctx = req
        .extensions()
        .get::<SessionContext>()
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !ctx.privileged {
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit-test-secret";

    #[test]
    fn lms_claims_become_linked_context() {
        let course = CourseInfo {
            course_name: "Algebra".into(),
            ..Default::default()
        };
        let token = sign_jwt(Claims::lms("u1", "Grace", "rl1", course), SECRET, 60).unwrap();
        let ctx = verify_jwt(&token, SECRET).unwrap().into_context(&token);

        assert_eq!(ctx.user_id, "u1");
        assert_eq!(ctx.mode.resource_link_id(), Some("rl1"));
        assert_eq!(ctx.mode.course().course_name, "Algebra");
        assert_eq!(ctx.token.as_deref(), Some(token.as_str()));
    }

    #[test]
    fn standalone_claims_carry_no_token() {
        let token = sign_jwt(Claims::standalone("solo"), SECRET, 60).unwrap();
        let ctx = verify_jwt(&token, SECRET).unwrap().into_context(&token);
        assert_eq!(ctx.mode, UserMode::Standalone);
        assert!(ctx.token.is_none());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = sign_jwt(Claims::standalone("solo"), SECRET, 60).unwrap();
        assert!(matches!(verify_jwt(&token, "other"), Err(AppError::AuthError(_))));
    }
}
