// src/store/local.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{ProgressStore, StoreError};
use crate::models::{
    badge::EarnedBadge,
    leaderboard::LeaderboardEntry,
    progress::{LessonKey, LessonProgress, LessonProgressUpdate, SessionCounters, UserRecord},
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceData {
    #[serde(default)]
    users: HashMap<String, UserRecord>,
    /// Keyed by `{userId}/{lessonDocumentId}`.
    #[serde(default)]
    lessons: HashMap<String, LessonProgress>,
    #[serde(default)]
    leaderboard: HashMap<String, LeaderboardEntry>,
}

/// File-backed store used as device storage for standalone users, and as the
/// only store when no database is configured. Without a path it lives purely
/// in memory.
pub struct LocalStore {
    path: Option<PathBuf>,
    data: RwLock<DeviceData>,
}

impl LocalStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: RwLock::new(DeviceData::default()),
        }
    }

    /// Opens the store file, starting empty if it does not exist yet.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let data = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("Device store {:?} not found, starting empty", path);
                DeviceData::default()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: Some(path),
            data: RwLock::new(data),
        })
    }

    /// Writes the snapshot next to the target and renames it into place.
    async fn flush(&self, data: &DeviceData) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let bytes = serde_json::to_vec_pretty(data)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Applies `change` to a copy of the data. The copy replaces the live
    /// data only once it has been written, so a failed write changes nothing.
    async fn commit<T>(
        &self,
        change: impl FnOnce(&mut DeviceData) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut data = self.data.write().await;
        let mut next = data.clone();
        let out = change(&mut next)?;
        self.flush(&next).await?;
        *data = next;
        Ok(out)
    }
}

fn lesson_slot(user_id: &str, key: &LessonKey) -> String {
    format!("{}/{}", user_id, key.document_id())
}

pub(crate) fn sort_leaderboard(entries: &mut [LeaderboardEntry]) {
    entries.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then(b.total_lessons_completed.cmp(&a.total_lessons_completed))
            .then(a.user_id.cmp(&b.user_id))
    });
}

#[async_trait]
impl ProgressStore for LocalStore {
    async fn load_user(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.data.read().await.users.get(user_id).cloned())
    }

    async fn ensure_user(
        &self,
        user_id: &str,
        student_name: Option<&str>,
    ) -> Result<UserRecord, StoreError> {
        if student_name.is_none() {
            if let Some(existing) = self.data.read().await.users.get(user_id) {
                return Ok(existing.clone());
            }
        }

        self.commit(|data| {
            let record = data
                .users
                .entry(user_id.to_string())
                .or_insert_with(|| UserRecord::new(user_id));
            if let Some(name) = student_name {
                record.student_name = Some(name.to_string());
            }
            Ok(record.clone())
        })
        .await
    }

    async fn increment_user_counters(
        &self,
        user_id: &str,
        delta: &SessionCounters,
    ) -> Result<(), StoreError> {
        self.commit(|data| {
            let record = data
                .users
                .entry(user_id.to_string())
                .or_insert_with(|| UserRecord::new(user_id));
            record.counters.points += delta.points;
            record.counters.total_problems_completed += delta.problems_completed;
            record.counters.total_lessons_completed += delta.lessons_completed;
            record.last_updated = Some(Utc::now());
            Ok(())
        })
        .await
    }

    async fn save_badges(&self, user_id: &str, badges: &[EarnedBadge]) -> Result<(), StoreError> {
        self.commit(|data| {
            let record = data
                .users
                .get_mut(user_id)
                .ok_or_else(|| StoreError::MissingUser(user_id.to_string()))?;
            record.badges = badges.to_vec();
            record.last_updated = Some(Utc::now());
            Ok(())
        })
        .await
    }

    async fn load_lesson_progress(
        &self,
        user_id: &str,
        key: &LessonKey,
    ) -> Result<Option<LessonProgress>, StoreError> {
        Ok(self
            .data
            .read()
            .await
            .lessons
            .get(&lesson_slot(user_id, key))
            .cloned())
    }

    async fn save_lesson_progress(
        &self,
        user_id: &str,
        key: &LessonKey,
        update: &LessonProgressUpdate,
    ) -> Result<(), StoreError> {
        self.commit(|data| {
            data.lessons
                .entry(lesson_slot(user_id, key))
                .or_default()
                .apply(key, update);
            Ok(())
        })
        .await
    }

    async fn load_leaderboard_entry(
        &self,
        user_id: &str,
    ) -> Result<Option<LeaderboardEntry>, StoreError> {
        Ok(self.data.read().await.leaderboard.get(user_id).cloned())
    }

    async fn put_leaderboard_entry(&self, entry: &LeaderboardEntry) -> Result<(), StoreError> {
        self.commit(|data| {
            data.leaderboard.insert(entry.user_id.clone(), entry.clone());
            Ok(())
        })
        .await
    }

    async fn top_leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, StoreError> {
        let mut entries: Vec<LeaderboardEntry> =
            self.data.read().await.leaderboard.values().cloned().collect();
        sort_leaderboard(&mut entries);
        entries.truncate(limit);
        Ok(entries)
    }

    async fn increment_leaderboard_lessons(&self, user_id: &str) -> Result<(), StoreError> {
        self.commit(|data| {
            let now = Utc::now();
            let entry = data
                .leaderboard
                .get_mut(user_id)
                .ok_or_else(|| StoreError::MissingUser(user_id.to_string()))?;
            entry.total_lessons_completed += 1;
            entry.last_activity = now;
            entry.updated_at = now;
            Ok(())
        })
        .await
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::progress::{CourseInfo, MasteryMark};

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("device_store_{}.json", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn counters_survive_reopen() {
        let path = temp_path();
        {
            let store = LocalStore::open(&path).await.unwrap();
            store.ensure_user("u1", None).await.unwrap();
            store
                .increment_user_counters(
                    "u1",
                    &SessionCounters {
                        points: 18,
                        problems_completed: 1,
                        lessons_completed: 0,
                    },
                )
                .await
                .unwrap();
        }

        let reopened = LocalStore::open(&path).await.unwrap();
        let user = reopened.load_user("u1").await.unwrap().unwrap();
        assert_eq!(user.counters.points, 18);
        assert_eq!(user.counters.total_problems_completed, 1);
        assert!(user.last_updated.is_some());

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn failed_write_leaves_data_unchanged() {
        let dir = std::env::temp_dir().join(format!("device_store_{}", uuid::Uuid::new_v4()));
        let store = LocalStore::open(dir.join("device.json")).await.unwrap();
        store.ensure_user("u1", None).await.unwrap();
        let delta = SessionCounters {
            points: 18,
            problems_completed: 1,
            lessons_completed: 0,
        };

        // A file where the store directory should be makes every write fail.
        std::fs::remove_dir_all(&dir).unwrap();
        std::fs::write(&dir, b"not a directory").unwrap();
        assert!(store.increment_user_counters("u1", &delta).await.is_err());
        assert!(store.save_badges("u1", &[]).await.is_err());
        let user = store.load_user("u1").await.unwrap().unwrap();
        assert_eq!(user.counters.points, 0);
        assert_eq!(user.counters.total_problems_completed, 0);

        std::fs::remove_file(&dir).unwrap();
        store.increment_user_counters("u1", &delta).await.unwrap();
        let user = store.load_user("u1").await.unwrap().unwrap();
        assert_eq!(user.counters.points, 18);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn ensure_user_keeps_existing_counters() {
        let store = LocalStore::in_memory();
        store.ensure_user("u1", None).await.unwrap();
        store
            .increment_user_counters(
                "u1",
                &SessionCounters {
                    points: 5,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let again = store.ensure_user("u1", None).await.unwrap();
        assert_eq!(again.counters.points, 5);
    }

    #[tokio::test]
    async fn lesson_progress_merge_keeps_mastery_when_absent() {
        let store = LocalStore::in_memory();
        let key = LessonKey {
            lesson_id: "lesson1".into(),
            resource_link_id: Some("rl9".into()),
        };
        let mark = MasteryMark {
            mastery: 0.6,
            is_completed: false,
            at: Utc::now(),
        };
        store
            .save_lesson_progress(
                "u1",
                &key,
                &LessonProgressUpdate {
                    completed_probs: vec!["p1".into()],
                    mastery: Some(mark),
                    course: CourseInfo::default(),
                },
            )
            .await
            .unwrap();
        store
            .save_lesson_progress(
                "u1",
                &key,
                &LessonProgressUpdate {
                    completed_probs: vec!["p1".into(), "p2".into()],
                    mastery: None,
                    course: CourseInfo::default(),
                },
            )
            .await
            .unwrap();

        let progress = store.load_lesson_progress("u1", &key).await.unwrap().unwrap();
        assert_eq!(progress.completed_probs, vec!["p1", "p2"]);
        assert_eq!(progress.mastery, Some(0.6));
        assert!(progress.activity_specific);
        assert_eq!(progress.resource_link_id, "rl9");

        let unlinked = LessonKey {
            lesson_id: "lesson1".into(),
            resource_link_id: None,
        };
        assert!(store.load_lesson_progress("u1", &unlinked).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn leaderboard_ties_are_ordered_by_lessons_then_user_id() {
        let store = LocalStore::in_memory();
        let now = Utc::now();
        for (id, points, lessons) in [("b", 50, 1), ("a", 50, 1), ("c", 50, 3), ("d", 90, 0)] {
            store
                .put_leaderboard_entry(&LeaderboardEntry {
                    user_id: id.into(),
                    display_name: id.to_uppercase(),
                    points,
                    total_lessons_completed: lessons,
                    last_activity: now,
                    updated_at: now,
                })
                .await
                .unwrap();
        }

        let ids: Vec<String> = store
            .top_leaderboard(10)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.user_id)
            .collect();
        assert_eq!(ids, vec!["d", "c", "a", "b"]);
        assert_eq!(store.top_leaderboard(2).await.unwrap().len(), 2);
    }
}
