// src/services/lesson.rs

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

use crate::{
    models::{
        badge::EarnedBadge,
        content::{Lesson, Problem, PublicProblem},
        progress::{LessonKey, LessonProgressUpdate, MasteryMark},
        session::{AbandonView, AnswerView, LessonStatus, Redirect, SessionContext, SessionView},
    },
    selection::{MasteryState, ProblemSelector, Selection},
    services::{
        catalog::ContentCatalog,
        passback::{ScoreReport, ScoreReporter},
        points::{AwardContext, ChannelObserver, CompletionKind, LedgerEvent, PointsLedger},
    },
    store::ProgressStore,
};

#[derive(Debug, thiserror::Error)]
pub enum LessonError {
    #[error("session is not learning (status: {0:?})")]
    NotLearning(LessonStatus),

    #[error("step '{0}' is not part of the current problem")]
    UnknownStep(String),

    #[error("the current problem is not solved yet")]
    ProblemUnsolved,
}

/// Shared collaborators of every lesson session.
#[derive(Clone)]
pub struct LessonDeps {
    pub catalog: Arc<ContentCatalog>,
    pub selector: Arc<ProblemSelector>,
    pub store: Arc<dyn ProgressStore>,
    pub reporter: Arc<dyn ScoreReporter>,
}

/// One learner working through one lesson.
///
/// Drives problem selection, checks answers, feeds the points ledger and
/// decides when progress is written back. A session is only ever touched
/// through its registry mutex.
pub struct LessonSession {
    id: Uuid,
    ctx: SessionContext,
    lesson: Lesson,
    deps: LessonDeps,
    ledger: PointsLedger,
    events: mpsc::UnboundedReceiver<LedgerEvent>,
    status: LessonStatus,
    redirect: Option<Redirect>,
    current: Option<Arc<Problem>>,
    solved_steps: HashSet<String>,
    step_attempts: HashMap<String, u32>,
    problem_awarded: bool,
    completed: HashSet<String>,
    mastery: MasteryState,
    session_mastery: f64,
    persisted_mastery: f64,
    score_posted: bool,
    last_touched: Instant,
}

impl LessonSession {
    /// Loads prior progress and moves to the first problem, or straight to
    /// the finished view when the lesson is already mastered.
    pub async fn start(
        deps: LessonDeps,
        ctx: SessionContext,
        lesson: Lesson,
        mastery: MasteryState,
    ) -> (Self, SessionView) {
        let mut ledger = PointsLedger::new(deps.store.clone(), &ctx);
        ledger.initialize().await;
        let (observer, events) = ChannelObserver::new();
        ledger.set_observer(Arc::new(observer));

        let mut session = Self {
            id: Uuid::new_v4(),
            ctx,
            lesson,
            deps,
            ledger,
            events,
            status: LessonStatus::LessonSelection,
            redirect: None,
            current: None,
            solved_steps: HashSet::new(),
            step_attempts: HashMap::new(),
            problem_awarded: false,
            completed: HashSet::new(),
            mastery,
            session_mastery: 0.0,
            persisted_mastery: 0.0,
            score_posted: false,
            last_touched: Instant::now(),
        };

        session.load_progress().await;
        let threshold = session.threshold();

        let points_earned = if session.persisted_mastery >= threshold {
            tracing::info!(
                "Lesson {} already completed by {} (persisted mastery {:.3})",
                session.lesson.id,
                session.ctx.user_id,
                session.persisted_mastery
            );
            session.finish();
            0
        } else if !session.ctx.privileged
            && session.mastery.lesson_score(&session.lesson) >= threshold
        {
            tracing::info!(
                "Lesson {} already mastered by {}, redirecting",
                session.lesson.id,
                session.ctx.user_id
            );
            session.finish();
            0
        } else {
            session.next_problem().await
        };

        let view = session.view(points_earned);
        (session, view)
    }

    async fn load_progress(&mut self) {
        let key = self.key();
        match self
            .deps
            .store
            .load_lesson_progress(&self.ctx.user_id, &key)
            .await
        {
            Ok(Some(progress)) => {
                tracing::debug!(
                    "Restored progress for {}: {} completed problems",
                    key.document_id(),
                    progress.completed_probs.len()
                );
                self.completed = progress.completed_probs.into_iter().collect();
                if let Some(mastery) = progress.mastery {
                    self.persisted_mastery = mastery;
                    self.session_mastery = mastery;
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!("Error loading lesson progress {}: {}", key.document_id(), e);
            }
        }
    }

    /// Checks one step answer. Solving the last step of the problem awards
    /// its points; a posted mastery at or above the threshold finalizes the
    /// lesson right away.
    pub async fn submit_answer(
        &mut self,
        step_id: &str,
        answer: &str,
        mastery: HashMap<String, f64>,
    ) -> Result<AnswerView, LessonError> {
        self.touch();
        let problem = self.learning_problem()?;
        let step = problem
            .step(step_id)
            .ok_or_else(|| LessonError::UnknownStep(step_id.to_string()))?;

        if !mastery.is_empty() {
            self.update_mastery(mastery);
        }

        let attempt = {
            let attempts = self.step_attempts.entry(step.id.clone()).or_insert(0);
            *attempts += 1;
            *attempts
        };
        self.ledger.track_problem_attempt(&problem.id);

        let correct = step.accepts(answer);
        if correct {
            self.solved_steps.insert(step.id.clone());
        }
        tracing::debug!(
            "{} answered {}/{} (attempt {}): {}",
            self.ctx.user_id,
            problem.id,
            step.id,
            attempt,
            if correct { "correct" } else { "incorrect" }
        );

        let mut points_earned = 0;
        let mut problem_solved = false;
        if correct && !self.problem_awarded && self.solved_steps.len() == problem.steps.len() {
            self.problem_awarded = true;
            problem_solved = true;
            let attempt_count = self.step_attempts.values().copied().max().unwrap_or(1);
            let ctx = AwardContext::Problem {
                knowledge_components: problem.knowledge_components().len(),
                attempt_count,
                lesson_progress: self.mastery.lesson_score(&self.lesson),
            };
            points_earned += self.ledger.award_points(true, &ctx).await;
            self.ledger.track_completion(true, CompletionKind::Problem).await;
        }

        if self.session_mastery >= self.threshold() {
            self.completed.insert(problem.id.clone());
            points_earned += self.finalize(self.session_mastery).await;
        }

        Ok(AnswerView {
            correct,
            attempt,
            problem_solved,
            points_earned,
            new_badges: self.drain_new_badges(),
            status: self.status,
            redirect: self.redirect.clone(),
            progress: self.ledger.snapshot(),
        })
    }

    /// Marks the current problem completed, writes progress back when the
    /// mastery improved, then selects the next problem.
    pub async fn complete_problem(
        &mut self,
        mastery: HashMap<String, f64>,
    ) -> Result<SessionView, LessonError> {
        self.touch();
        let problem = self.learning_problem()?;
        if !self.problem_awarded {
            return Err(LessonError::ProblemUnsolved);
        }

        if !mastery.is_empty() {
            self.update_mastery(mastery);
        }
        self.completed.insert(problem.id.clone());

        let threshold = self.threshold();
        let improved = self.session_mastery > self.persisted_mastery;
        if improved || self.session_mastery >= threshold {
            self.ledger.persist_accumulated_points().await;
        } else {
            tracing::debug!(
                "Mastery unchanged for {}, keeping {} session points unflushed",
                self.ctx.user_id,
                self.ledger.session_points()
            );
        }
        if improved {
            self.persist_mastery(self.session_mastery).await;
        } else {
            self.save_completed().await;
        }

        let points_earned = self.next_problem().await;
        Ok(self.view(points_earned))
    }

    /// Leaves the lesson without finishing it. Unflushed points are dropped,
    /// as is any mastery gained since the last write. The session rejects
    /// every later answer or next-problem request.
    pub fn abandon(&mut self) -> AbandonView {
        let mut view = AbandonView {
            lost_points: 0,
            dropped_mastery: None,
        };

        if self.status == LessonStatus::Learning {
            view.lost_points = self.ledger.reset_session_points();
            if view.lost_points > 0 {
                tracing::info!(
                    "{} left lesson {} without completing, lost {} unpersisted points",
                    self.ctx.user_id,
                    self.lesson.id,
                    view.lost_points
                );
            }
            if self.session_mastery > self.persisted_mastery {
                tracing::info!(
                    "{} left without saving mastery progress (session {:.3}, persisted {:.3})",
                    self.ctx.user_id,
                    self.session_mastery,
                    self.persisted_mastery
                );
                view.dropped_mastery = Some(self.session_mastery);
            }
        }

        self.status = LessonStatus::Abandoned;
        self.current = None;
        self.redirect = None;
        self.ledger.clear_observer();
        view
    }

    /// Current state without changing anything.
    pub fn snapshot(&mut self) -> SessionView {
        self.touch();
        self.view(0)
    }

    async fn next_problem(&mut self) -> i64 {
        let selection = self.deps.selector.select(
            self.deps.catalog.problems(),
            &self.mastery,
            &mut self.completed,
            &self.lesson,
        );

        match selection {
            Selection::Problem(candidate) => {
                tracing::debug!(
                    "Next problem for {}: {} (mastery {:?})",
                    self.ctx.user_id,
                    candidate.problem.id,
                    candidate.prob_mastery
                );
                self.current = Some(candidate.problem);
                self.solved_steps.clear();
                self.step_attempts.clear();
                self.problem_awarded = false;
                self.status = LessonStatus::Learning;
                0
            }
            Selection::Graduated { score } => self.finalize(score).await,
            Selection::Exhausted => {
                self.current = None;
                self.status = LessonStatus::Exhausted;
                0
            }
        }
    }

    /// Awards the lesson, flushes everything and redirects to the finished
    /// view. Returns the lesson points.
    async fn finalize(&mut self, mastery: f64) -> i64 {
        tracing::info!(
            "Finalizing lesson {} for {} at mastery {:.3}",
            self.lesson.id,
            self.ctx.user_id,
            mastery
        );

        let points = self
            .ledger
            .award_points(
                true,
                &AwardContext::LessonCompletion {
                    mastery_percentage: (mastery * 100.0).round(),
                },
            )
            .await;
        self.ledger.track_completion(true, CompletionKind::Lesson).await;
        self.ledger.persist_accumulated_points().await;
        self.persist_mastery(mastery).await;
        tracing::info!(
            "{} now holds {} points over {} lessons",
            self.ctx.user_id,
            self.ledger.persisted_points(),
            self.ledger.total_lessons_completed()
        );

        self.session_mastery = mastery;
        self.finish();
        points
    }

    /// Writes mastery and the completed set. Reaching the threshold also
    /// reports the score to the LMS, once per session.
    async fn persist_mastery(&mut self, mastery: f64) {
        let is_completed = mastery >= self.threshold();
        let update = LessonProgressUpdate {
            completed_probs: self.completed_list(),
            mastery: Some(MasteryMark {
                mastery,
                is_completed,
                at: Utc::now(),
            }),
            course: self.ctx.mode.course(),
        };

        if let Err(e) = self
            .deps
            .store
            .save_lesson_progress(&self.ctx.user_id, &self.key(), &update)
            .await
        {
            tracing::error!("Error persisting mastery for {}: {}", self.ctx.user_id, e);
            return;
        }
        tracing::info!("Mastery persisted for {}: {:.3}", self.ctx.user_id, mastery);
        self.persisted_mastery = mastery;

        if !is_completed || self.score_posted {
            return;
        }
        if let Some(token) = self.ctx.token.clone() {
            self.score_posted = true;
            self.deps
                .reporter
                .post_score(ScoreReport {
                    token,
                    mastery,
                    components: self.mastery.objective_components(&self.lesson),
                })
                .await;
        }
    }

    async fn save_completed(&self) {
        let update = LessonProgressUpdate {
            completed_probs: self.completed_list(),
            mastery: None,
            course: self.ctx.mode.course(),
        };
        if let Err(e) = self
            .deps
            .store
            .save_lesson_progress(&self.ctx.user_id, &self.key(), &update)
            .await
        {
            tracing::error!("Error saving completed problems for {}: {}", self.ctx.user_id, e);
        }
    }

    fn update_mastery(&mut self, raw: HashMap<String, f64>) {
        self.mastery = MasteryState::new(raw);
        self.session_mastery = self.mastery.lesson_score(&self.lesson);
    }

    fn finish(&mut self) {
        self.status = LessonStatus::Graduated;
        self.current = None;
        self.redirect = Some(Redirect::AssignmentFinished {
            lesson_id: self.lesson.id.clone(),
        });
    }

    fn learning_problem(&self) -> Result<Arc<Problem>, LessonError> {
        match (&self.status, &self.current) {
            (LessonStatus::Learning, Some(problem)) => Ok(problem.clone()),
            (status, _) => Err(LessonError::NotLearning(*status)),
        }
    }

    fn drain_new_badges(&mut self) -> Vec<EarnedBadge> {
        let mut badges = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            if let LedgerEvent::BadgesEarned(batch) = event {
                badges.extend(batch);
            }
        }
        badges
    }

    fn view(&mut self, points_earned: i64) -> SessionView {
        SessionView {
            session_id: self.id,
            lesson_id: self.lesson.id.clone(),
            status: self.status,
            problem: self.current.as_deref().map(PublicProblem::from),
            redirect: self.redirect.clone(),
            mastery: self.session_mastery,
            points_earned,
            new_badges: self.drain_new_badges(),
            progress: self.ledger.snapshot(),
        }
    }

    fn key(&self) -> LessonKey {
        LessonKey {
            lesson_id: self.lesson.id.clone(),
            resource_link_id: self.ctx.mode.resource_link_id().map(str::to_string),
        }
    }

    fn completed_list(&self) -> Vec<String> {
        let mut list: Vec<String> = self.completed.iter().cloned().collect();
        list.sort();
        list
    }

    fn threshold(&self) -> f64 {
        self.deps.selector.threshold()
    }

    fn touch(&mut self) {
        self.last_touched = Instant::now();
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> &str {
        &self.ctx.user_id
    }

    pub fn status(&self) -> LessonStatus {
        self.status
    }

    pub fn idle_for(&self) -> Duration {
        self.last_touched.elapsed()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::services::passback::{LinkRequest, PassbackError};

    /// Remembers every posted score.
    #[derive(Default)]
    pub struct RecordingReporter {
        pub scores: Mutex<Vec<ScoreReport>>,
    }

    #[async_trait]
    impl ScoreReporter for RecordingReporter {
        async fn post_score(&self, report: ScoreReport) {
            self.scores.lock().unwrap().push(report);
        }

        async fn set_lesson(&self, _request: LinkRequest<'_>) -> Result<(), PassbackError> {
            Ok(())
        }
    }

    /// A standalone session on a one-problem lesson, backed by memory only.
    pub async fn sample_session(user_id: &str) -> LessonSession {
        let plans = serde_json::from_str(
            r#"[{"courseName": "Algebra", "lessons": [
                {"id": "l1", "name": "Lesson 1", "learningObjectives": {"add": 0.95}}
            ]}]"#,
        )
        .unwrap();
        let problems = serde_json::from_str(
            r#"[{"id": "p1", "courseName": "Algebra", "steps": [{"id": "p1a", "stepAnswer": ["2"]}]}]"#,
        )
        .unwrap();
        let skill_model = HashMap::from([("p1a".to_string(), vec!["add".to_string()])]);
        let catalog = Arc::new(ContentCatalog::from_parts(plans, problems, skill_model).unwrap());
        let lesson = catalog.lesson("l1").unwrap().clone();
        let deps = LessonDeps {
            catalog,
            selector: Arc::new(ProblemSelector::new(
                0.95,
                Arc::new(crate::selection::LeastMasteredFirst),
            )),
            store: Arc::new(crate::store::local::LocalStore::in_memory()),
            reporter: Arc::new(RecordingReporter::default()),
        };
        let mastery = MasteryState::new(HashMap::from([("add".to_string(), 0.2)]));
        let (session, _) =
            LessonSession::start(deps, SessionContext::standalone(user_id), lesson, mastery).await;
        session
    }
}
