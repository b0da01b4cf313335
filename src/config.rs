// src/config.rs

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use dotenvy::dotenv;
use url::Url;

/// Lesson score at which a lesson counts as mastered.
pub const DEFAULT_MASTERY_THRESHOLD: f64 = 0.95;

/// Rank lookups only scan this many leaderboard rows.
pub const LEADERBOARD_RANK_WINDOW: usize = 100;

/// Upper bound for `GET /api/leaderboard?limit=`.
pub const LEADERBOARD_MAX_LIMIT: usize = 100;

pub const ANONYMOUS_STUDENT: &str = "Anonymous Student";

/// Problems whose course name starts with this marker are disabled.
pub const DISABLED_COURSE_PREFIX: &str = "!!";

/// How often the session reaper wakes up.
pub const SESSION_REAPER_INTERVAL_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string. Without it every user is served from the
    /// device store.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub bind_addr: SocketAddr,
    /// Directory holding `course_plans.json`, `problem_pool.json` and `skill_model.json`.
    pub content_dir: PathBuf,
    pub device_store_path: PathBuf,
    /// LTI middleware used for score passback and assignment linking.
    pub middleware_url: Option<Url>,
    pub mastery_threshold: f64,
    pub session_idle_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());

        let jwt_secret = env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;

        let jwt_expiration = parse_var("JWT_EXPIRATION", 86_400)?;

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let bind_addr = parse_var("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?;

        let content_dir = env::var("CONTENT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("content"));

        let device_store_path = env::var("DEVICE_STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/device_store.json"));

        let middleware_url = match env::var("MIDDLEWARE_URL") {
            Ok(raw) if !raw.is_empty() => Some(Url::parse(&raw).map_err(|e| {
                ConfigError::Invalid {
                    name: "MIDDLEWARE_URL",
                    reason: e.to_string(),
                }
            })?),
            _ => None,
        };

        let mastery_threshold: f64 = parse_var("MASTERY_THRESHOLD", DEFAULT_MASTERY_THRESHOLD)?;
        if !(0.0..=1.0).contains(&mastery_threshold) {
            return Err(ConfigError::Invalid {
                name: "MASTERY_THRESHOLD",
                reason: "must be within [0, 1]".to_string(),
            });
        }

        let session_idle_secs = parse_var("SESSION_IDLE_SECS", 1_800)?;

        Ok(Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            bind_addr,
            content_dir,
            device_store_path,
            middleware_url,
            mastery_threshold,
            session_idle_secs,
        })
    }
}

fn parse_var<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}
