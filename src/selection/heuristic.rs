// src/selection/heuristic.rs

use std::collections::HashSet;
use std::sync::Arc;

use rand::Rng;

use crate::models::content::Problem;

/// A problem scored for one selection round.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub problem: Arc<Problem>,
    /// Product of the mastery of the problem's skills, or `None` when the
    /// problem exercises none of the lesson's objectives.
    pub prob_mastery: Option<f64>,
}

/// Picks the next problem among the scored candidates.
pub trait SelectionHeuristic: Send + Sync {
    fn choose<'a>(
        &self,
        candidates: &'a [Candidate],
        completed: &HashSet<String>,
    ) -> Option<&'a Candidate>;
}

fn open_relevant<'a, 'b>(
    candidates: &'a [Candidate],
    completed: &'b HashSet<String>,
) -> impl Iterator<Item = (&'a Candidate, f64)> {
    candidates
        .iter()
        .filter(|c| !completed.contains(&c.problem.id))
        .filter_map(|c| c.prob_mastery.map(|p| (c, p)))
}

/// Lowest mastery first; ties keep pool order.
#[derive(Debug, Default, Clone, Copy)]
pub struct LeastMasteredFirst;

impl SelectionHeuristic for LeastMasteredFirst {
    fn choose<'a>(
        &self,
        candidates: &'a [Candidate],
        completed: &HashSet<String>,
    ) -> Option<&'a Candidate> {
        let mut best: Option<(&Candidate, f64)> = None;
        for (candidate, p) in open_relevant(candidates, completed) {
            match best {
                Some((_, best_p)) if p >= best_p => {}
                _ => best = Some((candidate, p)),
            }
        }
        best.map(|(c, _)| c)
    }
}

/// Samples relevant, uncompleted problems with weight `1 - probMastery`, so
/// weaker skills come up more often. Falls back to a uniform pick when every
/// candidate is fully mastered.
#[derive(Debug, Default, Clone, Copy)]
pub struct WeightedRandom;

impl SelectionHeuristic for WeightedRandom {
    fn choose<'a>(
        &self,
        candidates: &'a [Candidate],
        completed: &HashSet<String>,
    ) -> Option<&'a Candidate> {
        let open: Vec<(&Candidate, f64)> = open_relevant(candidates, completed)
            .map(|(c, p)| (c, (1.0 - p).max(0.0)))
            .collect();
        if open.is_empty() {
            return None;
        }

        let mut rng = rand::thread_rng();
        let total: f64 = open.iter().map(|(_, w)| w).sum();
        if total <= f64::EPSILON {
            return Some(open[rng.gen_range(0..open.len())].0);
        }

        let mut roll = rng.gen_range(0.0..total);
        for (candidate, weight) in &open {
            if roll < *weight {
                return Some(*candidate);
            }
            roll -= weight;
        }
        open.last().map(|(c, _)| *c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, prob_mastery: Option<f64>) -> Candidate {
        Candidate {
            problem: Arc::new(Problem {
                id: id.into(),
                title: String::new(),
                course_name: "Course".into(),
                lesson: "Lesson".into(),
                steps: vec![],
            }),
            prob_mastery,
        }
    }

    #[test]
    fn least_mastered_skips_completed_and_irrelevant() {
        let pool = vec![
            candidate("p1", Some(0.2)),
            candidate("p2", None),
            candidate("p3", Some(0.4)),
            candidate("p4", Some(0.2)),
        ];
        let completed = HashSet::from(["p1".to_string()]);

        let chosen = LeastMasteredFirst.choose(&pool, &completed).unwrap();
        assert_eq!(chosen.problem.id, "p4");

        let none_relevant = vec![candidate("x", None)];
        assert!(LeastMasteredFirst.choose(&none_relevant, &HashSet::new()).is_none());
    }

    #[test]
    fn least_mastered_ties_keep_pool_order() {
        let pool = vec![candidate("a", Some(0.3)), candidate("b", Some(0.3))];
        let chosen = LeastMasteredFirst.choose(&pool, &HashSet::new()).unwrap();
        assert_eq!(chosen.problem.id, "a");
    }

    #[test]
    fn weighted_random_only_returns_open_relevant_problems() {
        let pool = vec![
            candidate("done", Some(0.0)),
            candidate("irrelevant", None),
            candidate("open", Some(0.5)),
            candidate("mastered", Some(1.0)),
        ];
        let completed = HashSet::from(["done".to_string()]);
        for _ in 0..50 {
            let chosen = WeightedRandom.choose(&pool, &completed).unwrap();
            assert_eq!(chosen.problem.id, "open");
        }
    }

    #[test]
    fn weighted_random_handles_fully_mastered_pool() {
        let pool = vec![candidate("a", Some(1.0)), candidate("b", Some(1.0))];
        let chosen = WeightedRandom.choose(&pool, &HashSet::new()).unwrap();
        assert!(chosen.problem.id == "a" || chosen.problem.id == "b");
    }
}
