// src/selection/mastery.rs

use std::collections::HashMap;

use crate::models::content::Lesson;

/// Read-only view over the per-skill mastery probabilities produced by the
/// client's knowledge tracing model.
#[derive(Debug, Clone, Default)]
pub struct MasteryState {
    skills: HashMap<String, f64>,
}

impl MasteryState {
    /// Values outside [0, 1] (or NaN) are dropped and treated as missing.
    pub fn new(raw: HashMap<String, f64>) -> Self {
        let skills = raw
            .into_iter()
            .filter(|(skill, p)| {
                let valid = (0.0..=1.0).contains(p);
                if !valid {
                    tracing::warn!("Ignoring malformed mastery value for skill {}: {}", skill, p);
                }
                valid
            })
            .collect();
        Self { skills }
    }

    pub fn get(&self, skill: &str) -> Option<f64> {
        self.skills.get(skill).copied()
    }

    /// Mean mastery over the lesson's objective skills. A skill without a
    /// value counts as 0; a lesson without objectives scores 0.
    pub fn lesson_score(&self, lesson: &Lesson) -> f64 {
        if lesson.learning_objectives.is_empty() {
            return 0.0;
        }
        let sum: f64 = lesson
            .learning_objectives
            .keys()
            .map(|skill| self.get(skill).unwrap_or(0.0))
            .sum();
        sum / lesson.learning_objectives.len() as f64
    }

    /// Mastery of each objective skill, as reported to the LMS.
    pub fn objective_components(&self, lesson: &Lesson) -> HashMap<String, f64> {
        lesson
            .learning_objectives
            .keys()
            .map(|skill| (skill.clone(), self.get(skill).unwrap_or(0.0)))
            .collect()
    }
}
