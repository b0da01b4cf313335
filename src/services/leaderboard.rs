// src/services/leaderboard.rs

use std::sync::Arc;

use chrono::Utc;

use crate::{
    config::{ANONYMOUS_STUDENT, LEADERBOARD_MAX_LIMIT, LEADERBOARD_RANK_WINDOW},
    models::{
        leaderboard::{LeaderboardEntry, LeaderboardUpdate},
        session::{SessionContext, UserMode},
    },
    store::{ProgressStore, StoreError},
    utils::html::clean_display_name,
};

/// Ranked points/lessons view over the shared leaderboard, scoped to one
/// caller. Writes are skipped for standalone users.
#[derive(Clone)]
pub struct LeaderboardService {
    store: Arc<dyn ProgressStore>,
    user_id: String,
    mode: UserMode,
    session_name: Option<String>,
}

impl LeaderboardService {
    pub fn new(store: Arc<dyn ProgressStore>, ctx: &SessionContext) -> Self {
        Self {
            store,
            user_id: ctx.user_id.clone(),
            mode: ctx.mode.clone(),
            session_name: ctx.student_name.clone(),
        }
    }

    /// Up to `limit` rows, points descending. Ties: lessons descending, then
    /// user id ascending.
    pub async fn get_top_users(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, StoreError> {
        let limit = limit.clamp(1, LEADERBOARD_MAX_LIMIT);
        let entries = self.store.top_leaderboard(limit).await?;
        tracing::debug!("Leaderboard: fetched {} top users", entries.len());
        Ok(entries)
    }

    /// 1-based rank of the caller within the top window, `None` outside of it.
    pub async fn get_user_rank(&self) -> Option<usize> {
        if !self.mode.is_cohort() {
            return None;
        }

        match self.store.top_leaderboard(LEADERBOARD_RANK_WINDOW).await {
            Ok(entries) => entries
                .iter()
                .position(|e| e.user_id == self.user_id)
                .map(|index| index + 1),
            Err(e) => {
                tracing::error!("Leaderboard: error getting rank for {}: {}", self.user_id, e);
                None
            }
        }
    }

    /// Merges `update` into the caller's row. Failures are logged only.
    pub async fn update_user_leaderboard(&self, update: LeaderboardUpdate) {
        if !self.mode.is_cohort() {
            tracing::debug!("Leaderboard: standalone user {}, skipping update", self.user_id);
            return;
        }

        if let Err(e) = self.merge(update).await {
            tracing::error!("Leaderboard: error updating entry for {}: {}", self.user_id, e);
        }
    }

    async fn merge(&self, update: LeaderboardUpdate) -> Result<(), StoreError> {
        let current = self.store.load_leaderboard_entry(&self.user_id).await?;
        let display_name = self.resolve_display_name(&update, current.as_ref()).await;
        let now = Utc::now();

        let entry = LeaderboardEntry {
            user_id: self.user_id.clone(),
            points: update
                .points
                .or(current.as_ref().map(|c| c.points))
                .unwrap_or(0),
            total_lessons_completed: update
                .total_lessons_completed
                .or(current.as_ref().map(|c| c.total_lessons_completed))
                .unwrap_or(0),
            display_name,
            last_activity: now,
            updated_at: now,
        };

        self.store.put_leaderboard_entry(&entry).await?;
        tracing::info!("Leaderboard: updated entry for {}", entry.display_name);
        Ok(())
    }

    /// Explicit override, then the stored name unless anonymous, then the
    /// launch context name, then the user profile, then the anonymous fallback.
    async fn resolve_display_name(
        &self,
        update: &LeaderboardUpdate,
        current: Option<&LeaderboardEntry>,
    ) -> String {
        if let Some(name) = update.display_name.as_deref().and_then(clean_display_name) {
            return name;
        }

        if let Some(name) = current
            .map(|c| c.display_name.as_str())
            .filter(|n| !n.is_empty() && *n != ANONYMOUS_STUDENT)
        {
            return name.to_string();
        }

        if let Some(name) = self.session_name.as_deref().and_then(clean_display_name) {
            return name;
        }

        match self.store.load_user(&self.user_id).await {
            Ok(Some(user)) => {
                if let Some(name) = user
                    .student_name
                    .as_deref()
                    .filter(|n| *n != ANONYMOUS_STUDENT)
                    .and_then(clean_display_name)
                {
                    return name;
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Leaderboard: could not fetch profile name for {}: {}", self.user_id, e);
            }
        }

        ANONYMOUS_STUDENT.to_string()
    }

    pub async fn update_display_name(&self, display_name: &str) {
        self.update_user_leaderboard(LeaderboardUpdate {
            display_name: Some(display_name.to_string()),
            ..Default::default()
        })
        .await;
    }

    /// Bumps only the lesson counter of the caller's row.
    pub async fn increment_lessons_completed(&self) {
        if !self.mode.is_cohort() {
            return;
        }
        if let Err(e) = self.store.increment_leaderboard_lessons(&self.user_id).await {
            tracing::error!(
                "Leaderboard: error incrementing lessons completed for {}: {}",
                self.user_id,
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::progress::CourseInfo;
    use crate::store::local::{LocalStore, testing::FlakyStore};

    fn cohort(user_id: &str, name: Option<&str>) -> SessionContext {
        SessionContext {
            user_id: user_id.into(),
            student_name: name.map(str::to_string),
            mode: UserMode::LmsLinked {
                resource_link_id: "rl1".into(),
                course: CourseInfo::default(),
            },
            privileged: false,
            token: None,
        }
    }

    fn points(p: i64) -> LeaderboardUpdate {
        LeaderboardUpdate {
            points: Some(p),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn name_priority_chain() {
        let store: Arc<dyn ProgressStore> = Arc::new(LocalStore::in_memory());

        // Nothing known yet: anonymous fallback.
        let anon = LeaderboardService::new(store.clone(), &cohort("u1", None));
        anon.update_user_leaderboard(points(10)).await;
        let row = store.load_leaderboard_entry("u1").await.unwrap().unwrap();
        assert_eq!(row.display_name, ANONYMOUS_STUDENT);

        // Stored name is anonymous, so the launch name wins.
        let named = LeaderboardService::new(store.clone(), &cohort("u1", Some("Grace")));
        named.update_user_leaderboard(points(20)).await;
        let row = store.load_leaderboard_entry("u1").await.unwrap().unwrap();
        assert_eq!(row.display_name, "Grace");
        assert_eq!(row.points, 20);

        // A real stored name beats the launch name.
        let renamed = LeaderboardService::new(store.clone(), &cohort("u1", Some("Other")));
        renamed.update_user_leaderboard(points(30)).await;
        let row = store.load_leaderboard_entry("u1").await.unwrap().unwrap();
        assert_eq!(row.display_name, "Grace");

        // An explicit override beats everything.
        renamed.update_display_name("<em>Hopper</em>").await;
        let row = store.load_leaderboard_entry("u1").await.unwrap().unwrap();
        assert_eq!(row.display_name, "Hopper");
        assert_eq!(row.points, 30);
    }

    #[tokio::test]
    async fn profile_name_is_used_before_anonymous() {
        let store: Arc<dyn ProgressStore> = Arc::new(LocalStore::in_memory());
        store.ensure_user("u2", Some("Ada")).await.unwrap();

        let service = LeaderboardService::new(store.clone(), &cohort("u2", None));
        service.update_user_leaderboard(points(7)).await;

        let row = store.load_leaderboard_entry("u2").await.unwrap().unwrap();
        assert_eq!(row.display_name, "Ada");
    }

    #[tokio::test]
    async fn rank_is_limited_to_window() {
        let store: Arc<dyn ProgressStore> = Arc::new(LocalStore::in_memory());
        for i in 0..(LEADERBOARD_RANK_WINDOW + 5) {
            let service = LeaderboardService::new(store.clone(), &cohort(&format!("u{:03}", i), None));
            service.update_user_leaderboard(points(1_000 - i as i64)).await;
        }

        let top = LeaderboardService::new(store.clone(), &cohort("u000", None));
        assert_eq!(top.get_user_rank().await, Some(1));
        let third = LeaderboardService::new(store.clone(), &cohort("u002", None));
        assert_eq!(third.get_user_rank().await, Some(3));
        let outside = LeaderboardService::new(store.clone(), &cohort("u103", None));
        assert_eq!(outside.get_user_rank().await, None);

        let listed = top.get_top_users(5).await.unwrap();
        assert_eq!(listed.len(), 5);
        assert!(listed.windows(2).all(|w| w[0].points >= w[1].points));
    }

    #[tokio::test]
    async fn standalone_users_never_write() {
        let store: Arc<dyn ProgressStore> = Arc::new(LocalStore::in_memory());
        let service = LeaderboardService::new(store.clone(), &SessionContext::standalone("solo"));
        service.update_user_leaderboard(points(99)).await;
        service.increment_lessons_completed().await;

        assert!(store.load_leaderboard_entry("solo").await.unwrap().is_none());
        assert_eq!(service.get_user_rank().await, None);
    }

    #[tokio::test]
    async fn increment_touches_only_lessons() {
        let store: Arc<dyn ProgressStore> = Arc::new(LocalStore::in_memory());
        let service = LeaderboardService::new(store.clone(), &cohort("u1", Some("Grace")));
        service.update_user_leaderboard(points(40)).await;
        service.increment_lessons_completed().await;

        let row = store.load_leaderboard_entry("u1").await.unwrap().unwrap();
        assert_eq!((row.points, row.total_lessons_completed), (40, 1));
    }

    #[tokio::test]
    async fn store_failures_are_swallowed_on_writes_and_surfaced_on_reads() {
        let flaky = Arc::new(FlakyStore::new());
        flaky.set_offline(true);
        let store: Arc<dyn ProgressStore> = flaky.clone();
        let service = LeaderboardService::new(store, &cohort("u1", None));

        service.update_user_leaderboard(points(5)).await;
        assert_eq!(service.get_user_rank().await, None);
        assert!(service.get_top_users(10).await.is_err());

        flaky.set_offline(false);
        assert!(flaky.inner.load_leaderboard_entry("u1").await.unwrap().is_none());
    }
}
