// src/models/content.rs

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::config::DISABLED_COURSE_PREFIX;

/// One step of a problem, as stored in the content pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,

    /// 'string', 'numeric' or 'mc'.
    #[serde(default = "default_answer_type")]
    pub answer_type: String,

    /// Accepted answers. Any of them counts as correct.
    #[serde(default)]
    pub step_answer: Vec<String>,

    #[serde(default)]
    pub body: Option<String>,

    /// Skills exercised by this step. Filled from the skill model at load time.
    #[serde(default)]
    pub knowledge_components: Vec<String>,
}

fn default_answer_type() -> String {
    "string".to_string()
}

impl Step {
    /// Strict comparison for multiple choice, trimmed and case-insensitive for
    /// text, numeric equality for numbers.
    pub fn accepts(&self, submitted: &str) -> bool {
        let submitted = submitted.trim();
        self.step_answer.iter().any(|expected| {
            let expected = expected.trim();
            match self.answer_type.as_str() {
                "mc" => expected == submitted,
                "numeric" => match (expected.parse::<f64>(), submitted.parse::<f64>()) {
                    (Ok(a), Ok(b)) => (a - b).abs() < 1e-9,
                    _ => expected == submitted,
                },
                _ => expected.eq_ignore_ascii_case(submitted),
            }
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub course_name: String,
    #[serde(default)]
    pub lesson: String,
    pub steps: Vec<Step>,
}

impl Problem {
    pub fn is_disabled(&self) -> bool {
        self.course_name.starts_with(DISABLED_COURSE_PREFIX)
    }

    /// Distinct knowledge components over all steps, sorted.
    pub fn knowledge_components(&self) -> Vec<String> {
        self.steps
            .iter()
            .flat_map(|s| s.knowledge_components.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn step(&self, step_id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == step_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub topics: String,
    /// Skill id -> target mastery.
    pub learning_objectives: HashMap<String, f64>,
    #[serde(default)]
    pub allow_recycle: bool,
    /// Filled in at load time from the owning course.
    #[serde(default)]
    pub course_name: String,
}

impl Lesson {
    pub fn has_objective(&self, skill: &str) -> bool {
        self.learning_objectives.contains_key(skill)
    }

    /// Objective skills in a stable order.
    pub fn objective_skills(&self) -> Vec<&str> {
        let mut skills: Vec<&str> = self.learning_objectives.keys().map(String::as_str).collect();
        skills.sort_unstable();
        skills
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoursePlan {
    pub course_name: String,
    #[serde(default)]
    pub course_oer: Option<String>,
    pub lessons: Vec<Lesson>,
}

/// DTO for sending a step to the client (excludes accepted answers).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicStep {
    pub id: String,
    pub answer_type: String,
    pub body: Option<String>,
}

/// DTO for sending a problem to the client.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProblem {
    pub id: String,
    pub title: String,
    pub course_name: String,
    pub lesson: String,
    pub steps: Vec<PublicStep>,
}

impl From<&Problem> for PublicProblem {
    fn from(p: &Problem) -> Self {
        Self {
            id: p.id.clone(),
            title: p.title.clone(),
            course_name: p.course_name.clone(),
            lesson: p.lesson.clone(),
            steps: p
                .steps
                .iter()
                .map(|s| PublicStep {
                    id: s.id.clone(),
                    answer_type: s.answer_type.clone(),
                    body: s.body.clone(),
                })
                .collect(),
        }
    }
}

/// Course listing row for the course selection screen.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSummary {
    pub index: usize,
    pub course_name: String,
    pub lesson_count: usize,
}

/// Lesson listing row for the lesson selection screen.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonSummary {
    pub id: String,
    pub name: String,
    pub topics: String,
    pub objectives: Vec<String>,
}

impl From<&Lesson> for LessonSummary {
    fn from(l: &Lesson) -> Self {
        Self {
            id: l.id.clone(),
            name: l.name.clone(),
            topics: l.topics.clone(),
            objectives: l.objective_skills().into_iter().map(str::to_string).collect(),
        }
    }
}
