// src/services/passback.rs

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::models::{content::Lesson, progress::CourseInfo};

/// Body of `POST {middleware}/postScore`.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreReport {
    pub token: String,
    pub mastery: f64,
    /// Mastery of each lesson objective skill.
    pub components: HashMap<String, f64>,
}

/// Body of `POST {middleware}/setLesson`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRequest<'a> {
    pub token: &'a str,
    pub lesson: &'a Lesson,
    #[serde(flatten)]
    pub course: &'a CourseInfo,
}

/// Details sent along with a `resource_already_linked` rejection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LinkConflict {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PassbackError {
    #[error("{} has already been linked to lesson {}", .0.from, .0.to)]
    AlreadyLinked(LinkConflict),

    #[error("session expired or invalidated")]
    Expired,

    #[error("not authorized to link lessons")]
    NotAuthorized,

    #[error("middleware rejected the request: {0}")]
    Rejected(String),

    #[error("middleware unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("no middleware configured")]
    NotConfigured,
}

/// Outbound calls to the LMS middleware.
#[async_trait]
pub trait ScoreReporter: Send + Sync {
    /// Reports a lesson score. Failures are logged, never returned.
    async fn post_score(&self, report: ScoreReport);

    /// Links the caller's assignment to `lesson`.
    async fn set_lesson(&self, request: LinkRequest<'_>) -> Result<(), PassbackError>;
}

pub struct MiddlewareClient {
    http: reqwest::Client,
    base: Url,
}

impl MiddlewareClient {
    pub fn new(base: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, PassbackError> {
        let base = self.base.as_str().trim_end_matches('/');
        Url::parse(&format!("{}/{}", base, path))
            .map_err(|e| PassbackError::Rejected(format!("bad middleware url: {}", e)))
    }
}

#[async_trait]
impl ScoreReporter for MiddlewareClient {
    async fn post_score(&self, report: ScoreReport) {
        let url = match self.endpoint("postScore") {
            Ok(url) => url,
            Err(e) => {
                tracing::error!("Error posting score: {}", e);
                return;
            }
        };

        match self.http.post(url).json(&report).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!("Posted score {:.3} to middleware", report.mastery);
            }
            Ok(response) => {
                tracing::error!("Score passback failed with status {}", response.status());
            }
            Err(e) => {
                tracing::error!("Error posting score: {}", e);
            }
        }
    }

    async fn set_lesson(&self, request: LinkRequest<'_>) -> Result<(), PassbackError> {
        let response = self
            .http
            .post(self.endpoint("setLesson")?)
            .json(&request)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status == 200 {
            tracing::info!(
                "Linked assignment '{}' to lesson {}",
                request.course.resource_link_title,
                request.lesson.id
            );
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_link_failure(status, &body))
    }
}

/// Reporter used when no middleware URL is configured.
pub struct DisabledReporter;

#[async_trait]
impl ScoreReporter for DisabledReporter {
    async fn post_score(&self, report: ScoreReport) {
        tracing::debug!("No middleware configured, dropping score {:.3}", report.mastery);
    }

    async fn set_lesson(&self, _request: LinkRequest<'_>) -> Result<(), PassbackError> {
        Err(PassbackError::NotConfigured)
    }
}

/// Maps a non-200 `setLesson` answer. A 400 body has the shape
/// `message|{json details}`.
pub fn classify_link_failure(status: u16, body: &str) -> PassbackError {
    match status {
        400 => {
            let (message, details) = body.split_once('|').unwrap_or((body, ""));
            if message == "resource_already_linked" {
                let conflict = serde_json::from_str(details).unwrap_or_else(|e| {
                    tracing::warn!("Unreadable link conflict details {:?}: {}", details, e);
                    LinkConflict::default()
                });
                PassbackError::AlreadyLinked(conflict)
            } else {
                PassbackError::Rejected(body.to_string())
            }
        }
        401 => PassbackError::Expired,
        403 => PassbackError::NotAuthorized,
        other => PassbackError::Rejected(format!("status {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_linked_carries_details() {
        let err = classify_link_failure(
            400,
            r#"resource_already_linked|{"from":"Week 3 quiz","to":"lesson2"}"#,
        );
        match err {
            PassbackError::AlreadyLinked(conflict) => {
                assert_eq!(conflict.from, "Week 3 quiz");
                assert_eq!(conflict.to, "lesson2");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn other_statuses() {
        assert!(matches!(classify_link_failure(401, ""), PassbackError::Expired));
        assert!(matches!(classify_link_failure(403, ""), PassbackError::NotAuthorized));
        assert!(matches!(
            classify_link_failure(400, "bad_token"),
            PassbackError::Rejected(body) if body == "bad_token"
        ));
        assert!(matches!(classify_link_failure(500, "boom"), PassbackError::Rejected(_)));
    }

    #[test]
    fn endpoints_tolerate_trailing_slash() {
        let client = MiddlewareClient::new(Url::parse("http://lms.local/api/").unwrap());
        assert_eq!(
            client.endpoint("postScore").unwrap().as_str(),
            "http://lms.local/api/postScore"
        );
    }
}
