// src/selection/selector.rs

use std::collections::HashSet;
use std::sync::Arc;

use crate::models::content::{Lesson, Problem};
use crate::selection::heuristic::{Candidate, SelectionHeuristic};
use crate::selection::mastery::MasteryState;

/// Outcome of one selection round.
#[derive(Debug, Clone)]
pub enum Selection {
    Problem(Candidate),
    /// The lesson score reached the mastery threshold.
    Graduated { score: f64 },
    /// No problem is left and the lesson does not allow recycling.
    Exhausted,
}

pub struct ProblemSelector {
    threshold: f64,
    heuristic: Arc<dyn SelectionHeuristic>,
}

impl ProblemSelector {
    pub fn new(threshold: f64, heuristic: Arc<dyn SelectionHeuristic>) -> Self {
        Self {
            threshold,
            heuristic,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Scores every enabled problem of the pool for this round.
    pub fn score_pool(
        &self,
        pool: &[Arc<Problem>],
        mastery: &MasteryState,
        lesson: &Lesson,
    ) -> Vec<Candidate> {
        pool.iter()
            .filter(|p| !p.is_disabled())
            .map(|problem| Candidate {
                prob_mastery: score_problem(problem, mastery, lesson),
                problem: Arc::clone(problem),
            })
            .collect()
    }

    /// Picks the next problem, or reports graduation / exhaustion.
    ///
    /// `completed` is cleared when the pool runs dry and the lesson allows
    /// recycling.
    pub fn select(
        &self,
        pool: &[Arc<Problem>],
        mastery: &MasteryState,
        completed: &mut HashSet<String>,
        lesson: &Lesson,
    ) -> Selection {
        let score = mastery.lesson_score(lesson);
        if score >= self.threshold {
            tracing::info!("Lesson {} graduated with score {:.3}", lesson.id, score);
            return Selection::Graduated { score };
        }

        let candidates = self.score_pool(pool, mastery, lesson);
        tracing::debug!(
            "Selecting for lesson {}: {} candidates, {} completed",
            lesson.id,
            candidates.len(),
            completed.len()
        );

        if let Some(chosen) = self.heuristic.choose(&candidates, completed) {
            return Selection::Problem(chosen.clone());
        }

        if !lesson.allow_recycle {
            tracing::info!("Problem pool exhausted for lesson {}", lesson.id);
            return Selection::Exhausted;
        }

        tracing::info!("Recycling completed problems for lesson {}", lesson.id);
        completed.clear();
        match self.heuristic.choose(&candidates, completed) {
            Some(chosen) => Selection::Problem(chosen.clone()),
            None => Selection::Exhausted,
        }
    }
}

/// Product of the mastery of every known skill the problem exercises, or
/// `None` if none of them is a lesson objective.
pub fn score_problem(problem: &Problem, mastery: &MasteryState, lesson: &Lesson) -> Option<f64> {
    let mut prob_mastery = 1.0;
    let mut is_relevant = false;

    for kc in problem.steps.iter().flat_map(|s| s.knowledge_components.iter()) {
        let Some(p) = mastery.get(kc) else {
            tracing::debug!("Mastery parameter {} does not exist for problem {}", kc, problem.id);
            continue;
        };
        if lesson.has_objective(kc) {
            is_relevant = true;
        }
        prob_mastery *= p;
    }

    is_relevant.then_some(prob_mastery)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::models::content::Step;
    use crate::selection::heuristic::LeastMasteredFirst;

    fn step(id: &str, kcs: &[&str]) -> Step {
        Step {
            id: id.into(),
            answer_type: "string".into(),
            step_answer: vec!["1".into()],
            body: None,
            knowledge_components: kcs.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn problem(id: &str, course: &str, kcs: &[&str]) -> Arc<Problem> {
        Arc::new(Problem {
            id: id.into(),
            title: id.into(),
            course_name: course.into(),
            lesson: "L".into(),
            steps: vec![step(&format!("{}a", id), kcs)],
        })
    }

    fn lesson(objectives: &[&str], allow_recycle: bool) -> Lesson {
        Lesson {
            id: "lesson1".into(),
            name: "Lesson 1".into(),
            topics: String::new(),
            learning_objectives: objectives.iter().map(|s| (s.to_string(), 0.95)).collect(),
            allow_recycle,
            course_name: "Course".into(),
        }
    }

    fn mastery(pairs: &[(&str, f64)]) -> MasteryState {
        MasteryState::new(pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect::<HashMap<_, _>>())
    }

    fn selector() -> ProblemSelector {
        ProblemSelector::new(0.95, Arc::new(LeastMasteredFirst))
    }

    #[test]
    fn irrelevant_problem_has_no_mastery_score() {
        let lesson = lesson(&["add"], false);
        let state = mastery(&[("add", 0.5), ("mul", 0.2)]);

        assert_eq!(score_problem(&problem("p", "C", &["mul"]), &state, &lesson), None);
        let both = score_problem(&problem("q", "C", &["add", "mul"]), &state, &lesson).unwrap();
        assert!((both - 0.1).abs() < 1e-12);
    }

    #[test]
    fn missing_parameter_does_not_make_problem_relevant() {
        let lesson = lesson(&["add"], false);
        let state = mastery(&[("mul", 0.3)]);
        assert_eq!(score_problem(&problem("p", "C", &["add", "mul"]), &state, &lesson), None);
    }

    #[test]
    fn irrelevant_problems_do_not_change_graduation() {
        let lesson = lesson(&["add"], false);
        let pool = vec![problem("p1", "C", &["add"]), problem("p2", "C", &["mul"])];
        // "mul" is not an objective, so its low mastery must not block graduation.
        let state = mastery(&[("add", 0.97), ("mul", 0.01)]);
        let mut completed = HashSet::new();

        match selector().select(&pool, &state, &mut completed, &lesson) {
            Selection::Graduated { score } => assert!((score - 0.97).abs() < 1e-12),
            other => panic!("expected graduation, got {:?}", other),
        }
    }

    #[test]
    fn disabled_problems_are_never_chosen() {
        let lesson = lesson(&["add"], false);
        let pool = vec![problem("hidden", "!!Draft", &["add"]), problem("p1", "C", &["add"])];
        let state = mastery(&[("add", 0.1)]);
        let scored = selector().score_pool(&pool, &state, &lesson);
        assert_eq!(scored.len(), 1);

        let mut completed = HashSet::new();
        match selector().select(&pool, &state, &mut completed, &lesson) {
            Selection::Problem(c) => assert_eq!(c.problem.id, "p1"),
            other => panic!("expected a problem, got {:?}", other),
        }
    }

    #[test]
    fn exhausted_without_recycling() {
        let lesson = lesson(&["add"], false);
        let pool = vec![problem("p1", "C", &["add"])];
        let state = mastery(&[("add", 0.1)]);
        let mut completed = HashSet::from(["p1".to_string()]);

        assert!(matches!(
            selector().select(&pool, &state, &mut completed, &lesson),
            Selection::Exhausted
        ));
        assert_eq!(completed.len(), 1);
    }

    #[test]
    fn recycling_clears_completed_and_retries() {
        let lesson = lesson(&["add"], true);
        let pool = vec![problem("p1", "C", &["add"])];
        let state = mastery(&[("add", 0.1)]);
        let mut completed = HashSet::from(["p1".to_string()]);

        match selector().select(&pool, &state, &mut completed, &lesson) {
            Selection::Problem(c) => assert_eq!(c.problem.id, "p1"),
            other => panic!("expected a recycled problem, got {:?}", other),
        }
        assert!(completed.is_empty());
    }

    #[test]
    fn recycling_with_no_relevant_problem_is_exhausted() {
        let lesson = lesson(&["add"], true);
        let pool = vec![problem("p1", "C", &["mul"])];
        let state = mastery(&[("add", 0.1), ("mul", 0.1)]);
        let mut completed = HashSet::new();

        assert!(matches!(
            selector().select(&pool, &state, &mut completed, &lesson),
            Selection::Exhausted
        ));
    }
}
