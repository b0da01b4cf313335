// src/services/points.rs

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;

use crate::{
    models::{
        badge::EarnedBadge,
        leaderboard::LeaderboardUpdate,
        progress::{ProgressCounters, ProgressSnapshot, SessionCounters},
        session::SessionContext,
    },
    services::{badges, leaderboard::LeaderboardService},
    store::ProgressStore,
};

const LESSON_BASE_POINTS: i64 = 100;
const PROBLEM_BASE_POINTS: i64 = 10;
const POINTS_PER_COMPONENT: i64 = 3;
const COMPONENT_BONUS_CAP: i64 = 15;
const FIRST_ATTEMPT_BONUS: i64 = 8;
const PROGRESS_BONUS: i64 = 10;
const PROBLEM_POINTS_CAP: i64 = 35;

/// What a point award is for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AwardContext {
    Problem {
        knowledge_components: usize,
        attempt_count: u32,
        /// Lesson score in [0, 1] at the time the problem was solved.
        lesson_progress: f64,
    },
    LessonCompletion {
        mastery_percentage: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionKind {
    Problem,
    Lesson,
}

/// Points for one correct completion.
pub fn compute_award(ctx: &AwardContext) -> i64 {
    match *ctx {
        AwardContext::LessonCompletion { mastery_percentage } => {
            let bonus = if mastery_percentage >= 90.0 {
                50
            } else if mastery_percentage >= 70.0 {
                25
            } else {
                0
            };
            LESSON_BASE_POINTS + bonus
        }
        AwardContext::Problem {
            knowledge_components,
            attempt_count,
            lesson_progress,
        } => {
            let components = i64::try_from(knowledge_components).unwrap_or(i64::MAX);
            let mut points = PROBLEM_BASE_POINTS
                + components
                    .saturating_mul(POINTS_PER_COMPONENT)
                    .min(COMPONENT_BONUS_CAP);
            if attempt_count == 1 {
                points += FIRST_ATTEMPT_BONUS;
            }
            if lesson_progress > 0.7 {
                points += PROGRESS_BONUS;
            }
            points.min(PROBLEM_POINTS_CAP)
        }
    }
}

/// Ledger notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEvent {
    PointsUpdated { total: i64 },
    BadgesEarned(Vec<EarnedBadge>),
}

pub trait LedgerObserver: Send + Sync {
    fn points_updated(&self, total: i64);

    /// Called once per batch of newly earned badges.
    fn badges_earned(&self, badges: &[EarnedBadge]);
}

/// Forwards ledger events into an unbounded channel.
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<LedgerEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LedgerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: LedgerEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Ledger event dropped, receiver is gone");
        }
    }
}

impl LedgerObserver for ChannelObserver {
    fn points_updated(&self, total: i64) {
        self.send(LedgerEvent::PointsUpdated { total });
    }

    fn badges_earned(&self, badges: &[EarnedBadge]) {
        self.send(LedgerEvent::BadgesEarned(badges.to_vec()));
    }
}

/// Points, problems and lessons earned in one session, kept apart from the
/// persisted totals until [`PointsLedger::persist_accumulated_points`].
/// The cumulative view is always `persisted + session`.
pub struct PointsLedger {
    store: Arc<dyn ProgressStore>,
    leaderboard: LeaderboardService,
    user_id: String,
    student_name: Option<String>,
    persisted: ProgressCounters,
    session: SessionCounters,
    badges: Vec<EarnedBadge>,
    problem_attempts: HashMap<String, u32>,
    observer: Option<Arc<dyn LedgerObserver>>,
}

impl PointsLedger {
    pub fn new(store: Arc<dyn ProgressStore>, ctx: &SessionContext) -> Self {
        Self {
            leaderboard: LeaderboardService::new(store.clone(), ctx),
            store,
            user_id: ctx.user_id.clone(),
            student_name: ctx.student_name.clone(),
            persisted: ProgressCounters::default(),
            session: SessionCounters::default(),
            badges: Vec::new(),
            problem_attempts: HashMap::new(),
            observer: None,
        }
    }

    /// Creates the user record if needed and loads the persisted counters.
    /// Store failures leave zeroed counters.
    pub async fn initialize(&mut self) {
        match self
            .store
            .ensure_user(&self.user_id, self.student_name.as_deref())
            .await
        {
            Ok(record) => {
                self.persisted = record.counters;
                self.badges = record.badges;
                tracing::debug!(
                    "Ledger for {} loaded: {} points, {} badges",
                    self.user_id,
                    self.persisted.points,
                    self.badges.len()
                );
            }
            Err(e) => {
                tracing::error!("Error initializing progress for {}: {}", self.user_id, e);
                self.persisted = ProgressCounters::default();
                self.badges.clear();
            }
        }
        self.session = SessionCounters::default();
        self.notify_points();
    }

    /// Adds the award for a correct completion to the session. Returns the
    /// points earned, 0 when `correct` is false.
    pub async fn award_points(&mut self, correct: bool, ctx: &AwardContext) -> i64 {
        if !correct {
            return 0;
        }

        let earned = compute_award(ctx);
        self.session.points += earned;
        self.notify_points();

        tracing::info!(
            "Points awarded to {}: {} (session {}, total {})",
            self.user_id,
            earned,
            self.session.points,
            self.total_points()
        );

        self.check_and_award_badges().await;
        earned
    }

    pub async fn track_completion(&mut self, correct: bool, kind: CompletionKind) {
        if !correct {
            return;
        }
        match kind {
            CompletionKind::Problem => self.session.problems_completed += 1,
            CompletionKind::Lesson => self.session.lessons_completed += 1,
        }
        self.check_and_award_badges().await;
    }

    /// Flushes the session deltas. Returns the points persisted, 0 when there
    /// was nothing to flush or the store failed; on failure the session
    /// counters stay as they were so the next call retries.
    pub async fn persist_accumulated_points(&mut self) -> i64 {
        if self.session.is_zero() {
            return 0;
        }

        let delta = self.session;
        if let Err(e) = self.store.increment_user_counters(&self.user_id, &delta).await {
            tracing::error!("Error persisting points for {}: {}", self.user_id, e);
            return 0;
        }

        self.persisted = self.persisted.plus(&delta);
        self.session = SessionCounters::default();

        self.leaderboard
            .update_user_leaderboard(LeaderboardUpdate {
                points: Some(self.persisted.points),
                total_lessons_completed: Some(self.persisted.total_lessons_completed),
                ..Default::default()
            })
            .await;

        tracing::info!("Persisted {} points for {}", delta.points, self.user_id);
        delta.points
    }

    /// Drops the unflushed points and returns how many were lost. Session
    /// problem and lesson counts are kept.
    pub fn reset_session_points(&mut self) -> i64 {
        let lost = self.session.points;
        self.session.points = 0;
        self.notify_points();
        lost
    }

    /// Grants every badge the cumulative counters now satisfy and returns the
    /// new ones. They are kept only once the store accepted them.
    pub async fn check_and_award_badges(&mut self) -> Vec<EarnedBadge> {
        let counters = self.cumulative();
        let fresh = badges::newly_earned(&counters, &self.badges);
        if fresh.is_empty() {
            return Vec::new();
        }

        let now = Utc::now();
        let earned: Vec<EarnedBadge> = fresh.iter().map(|rule| rule.earn(now)).collect();
        let mut merged = self.badges.clone();
        merged.extend(earned.iter().cloned());

        if let Err(e) = self.store.save_badges(&self.user_id, &merged).await {
            tracing::error!("Error saving badges for {}: {}", self.user_id, e);
            return Vec::new();
        }

        self.badges = merged;
        tracing::info!(
            "{} earned badges: {:?}",
            self.user_id,
            earned.iter().map(|b| b.id.as_str()).collect::<Vec<_>>()
        );
        if let Some(observer) = &self.observer {
            observer.badges_earned(&earned);
        }
        earned
    }

    /// Counts one more attempt at `problem_id` and returns the new count.
    pub fn track_problem_attempt(&mut self, problem_id: &str) -> u32 {
        let attempts = self
            .problem_attempts
            .entry(problem_id.to_string())
            .or_insert(0);
        *attempts += 1;
        *attempts
    }

    pub fn total_points(&self) -> i64 {
        self.persisted.points + self.session.points
    }

    pub fn session_points(&self) -> i64 {
        self.session.points
    }

    pub fn persisted_points(&self) -> i64 {
        self.persisted.points
    }

    pub fn total_lessons_completed(&self) -> i64 {
        self.cumulative().total_lessons_completed
    }

    pub fn cumulative(&self) -> ProgressCounters {
        self.persisted.plus(&self.session)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let cumulative = self.cumulative();
        ProgressSnapshot {
            total_points: cumulative.points,
            session_points: self.session.points,
            total_problems_completed: cumulative.total_problems_completed,
            session_problems_completed: self.session.problems_completed,
            total_lessons_completed: cumulative.total_lessons_completed,
            session_lessons_completed: self.session.lessons_completed,
            badges: self.badges.clone(),
        }
    }

    /// Replaces any previous observer.
    pub fn set_observer(&mut self, observer: Arc<dyn LedgerObserver>) {
        self.observer = Some(observer);
    }

    pub fn clear_observer(&mut self) {
        self.observer = None;
    }

    fn notify_points(&self) {
        if let Some(observer) = &self.observer {
            observer.points_updated(self.total_points());
        }
    }
}
