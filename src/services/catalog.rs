// src/services/catalog.rs

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::models::content::{CoursePlan, Lesson, Problem};

pub const COURSE_PLANS_FILE: &str = "course_plans.json";
pub const PROBLEM_POOL_FILE: &str = "problem_pool.json";
pub const SKILL_MODEL_FILE: &str = "skill_model.json";

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("lesson id '{0}' is used more than once")]
    DuplicateLesson(String),
}

/// Courses, lessons and the problem pool, loaded once at startup.
#[derive(Debug)]
pub struct ContentCatalog {
    courses: Vec<CoursePlan>,
    problems: Vec<Arc<Problem>>,
}

impl ContentCatalog {
    /// Reads the course plans, problem pool and skill model from `dir`.
    pub async fn load(dir: &Path) -> Result<Self, CatalogError> {
        let courses: Vec<CoursePlan> = read_json(&dir.join(COURSE_PLANS_FILE)).await?;
        let problems: Vec<Problem> = read_json(&dir.join(PROBLEM_POOL_FILE)).await?;
        let skill_model: HashMap<String, Vec<String>> =
            read_json(&dir.join(SKILL_MODEL_FILE)).await?;

        let catalog = Self::from_parts(courses, problems, skill_model)?;
        tracing::info!(
            "Loaded {} courses and {} problems from {:?}",
            catalog.courses.len(),
            catalog.problems.len(),
            dir
        );
        Ok(catalog)
    }

    /// Builds the catalog, attaching each step's knowledge components from
    /// `skill_model` (step id -> skills).
    pub fn from_parts(
        mut courses: Vec<CoursePlan>,
        problems: Vec<Problem>,
        skill_model: HashMap<String, Vec<String>>,
    ) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for course in &mut courses {
            for lesson in &mut course.lessons {
                if !seen.insert(lesson.id.clone()) {
                    return Err(CatalogError::DuplicateLesson(lesson.id.clone()));
                }
                lesson.course_name = course.course_name.clone();
            }
        }

        let problems = problems
            .into_iter()
            .map(|mut problem| {
                for step in &mut problem.steps {
                    step.knowledge_components = skill_model
                        .get(&step.id)
                        .map(|kcs| clean_components(kcs))
                        .unwrap_or_default();
                }
                Arc::new(problem)
            })
            .collect();

        Ok(Self { courses, problems })
    }

    pub fn courses(&self) -> &[CoursePlan] {
        &self.courses
    }

    pub fn course(&self, index: usize) -> Option<&CoursePlan> {
        self.courses.get(index)
    }

    pub fn lesson(&self, lesson_id: &str) -> Option<&Lesson> {
        self.courses
            .iter()
            .flat_map(|c| c.lessons.iter())
            .find(|l| l.id == lesson_id)
    }

    pub fn problems(&self) -> &[Arc<Problem>] {
        &self.problems
    }

    pub fn problem(&self, problem_id: &str) -> Option<&Arc<Problem>> {
        self.problems.iter().find(|p| p.id == problem_id)
    }
}

/// Drops blank entries and duplicates, keeping first-seen order.
fn clean_components(kcs: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    kcs.iter()
        .map(|kc| kc.trim())
        .filter(|kc| !kc.is_empty() && seen.insert(kc.to_string()))
        .map(str::to_string)
        .collect()
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CatalogError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| CatalogError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn courses() -> Vec<CoursePlan> {
        serde_json::from_str(
            r#"[{
                "courseName": "Algebra",
                "lessons": [
                    {"id": "l1", "name": "Lesson 1", "learningObjectives": {"add": 0.95}},
                    {"id": "l2", "name": "Lesson 2", "learningObjectives": {"mul": 0.95}, "allowRecycle": true}
                ]
            }]"#,
        )
        .unwrap()
    }

    fn problems() -> Vec<Problem> {
        serde_json::from_str(
            r#"[{
                "id": "p1",
                "courseName": "Algebra",
                "steps": [{"id": "p1a", "stepAnswer": ["2"]}, {"id": "p1b", "stepAnswer": ["4"]}]
            }]"#,
        )
        .unwrap()
    }

    #[test]
    fn knowledge_components_come_from_skill_model() {
        let skill_model = HashMap::from([
            ("p1a".to_string(), vec!["add".to_string(), " ".to_string(), "add".to_string()]),
            ("p1b".to_string(), vec!["mul".to_string()]),
        ]);
        let catalog = ContentCatalog::from_parts(courses(), problems(), skill_model).unwrap();

        let problem = catalog.problem("p1").unwrap();
        assert_eq!(problem.steps[0].knowledge_components, vec!["add"]);
        assert_eq!(problem.knowledge_components(), vec!["add", "mul"]);
    }

    #[test]
    fn lessons_know_their_course() {
        let catalog = ContentCatalog::from_parts(courses(), problems(), HashMap::new()).unwrap();
        let lesson = catalog.lesson("l2").unwrap();
        assert_eq!(lesson.course_name, "Algebra");
        assert!(lesson.allow_recycle);
        assert!(catalog.lesson("missing").is_none());
        assert_eq!(catalog.course(0).map(|c| c.lessons.len()), Some(2));
    }

    #[test]
    fn duplicate_lesson_ids_are_rejected() {
        let mut plans = courses();
        plans[0].lessons[1].id = "l1".into();
        assert!(matches!(
            ContentCatalog::from_parts(plans, problems(), HashMap::new()),
            Err(CatalogError::DuplicateLesson(id)) if id == "l1"
        ));
    }
}
