// src/services/badges.rs

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::models::{
    badge::{BadgeProgress, EarnedBadge},
    progress::ProgressCounters,
};

/// Which cumulative counter a badge watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeMetric {
    ProblemsCompleted,
    LessonsCompleted,
}

impl BadgeMetric {
    fn read(self, counters: &ProgressCounters) -> i64 {
        match self {
            BadgeMetric::ProblemsCompleted => counters.total_problems_completed,
            BadgeMetric::LessonsCompleted => counters.total_lessons_completed,
        }
    }
}

/// An achievement rule: earned once `metric >= target`.
#[derive(Debug, Clone, Copy)]
pub struct BadgeRule {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub metric: BadgeMetric,
    pub target: i64,
}

impl BadgeRule {
    pub fn is_met(&self, counters: &ProgressCounters) -> bool {
        self.metric.read(counters) >= self.target
    }

    pub fn earn(&self, at: DateTime<Utc>) -> EarnedBadge {
        EarnedBadge {
            id: self.id.to_string(),
            name: self.name.to_string(),
            description: self.description.to_string(),
            icon: self.icon.to_string(),
            earned_at: at,
        }
    }
}

pub const BADGE_RULES: [BadgeRule; 3] = [
    BadgeRule {
        id: "first_problem",
        name: "First Step",
        description: "Completed your first problem",
        icon: "🚀",
        metric: BadgeMetric::ProblemsCompleted,
        target: 1,
    },
    BadgeRule {
        id: "lesson_master",
        name: "Lesson Master",
        description: "Completed 5 lessons",
        icon: "🎓",
        metric: BadgeMetric::LessonsCompleted,
        target: 5,
    },
    BadgeRule {
        id: "problem_solver",
        name: "Problem Solver",
        description: "Completed 50 problems",
        icon: "💡",
        metric: BadgeMetric::ProblemsCompleted,
        target: 50,
    },
];

/// Rules satisfied by the cumulative counters, in table order.
pub fn evaluate(counters: &ProgressCounters) -> Vec<&'static BadgeRule> {
    BADGE_RULES.iter().filter(|rule| rule.is_met(counters)).collect()
}

/// Rules satisfied now that are not in `earned` yet.
pub fn newly_earned(
    counters: &ProgressCounters,
    earned: &[EarnedBadge],
) -> Vec<&'static BadgeRule> {
    let held: HashSet<&str> = earned.iter().map(|b| b.id.as_str()).collect();
    evaluate(counters)
        .into_iter()
        .filter(|rule| !held.contains(rule.id))
        .collect()
}

/// Progress towards every badge not earned yet.
pub fn progress(counters: &ProgressCounters, earned: &[EarnedBadge]) -> Vec<BadgeProgress> {
    let held: HashSet<&str> = earned.iter().map(|b| b.id.as_str()).collect();
    BADGE_RULES
        .iter()
        .filter(|rule| !held.contains(rule.id))
        .map(|rule| BadgeProgress {
            id: rule.id.to_string(),
            name: rule.name.to_string(),
            icon: rule.icon.to_string(),
            current: rule.metric.read(counters).min(rule.target),
            target: rule.target,
        })
        .collect()
}
