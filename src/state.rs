// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;

use crate::{
    config::Config,
    models::session::SessionContext,
    selection::ProblemSelector,
    services::{
        catalog::ContentCatalog, lesson::LessonDeps, passback::ScoreReporter,
        registry::SessionRegistry,
    },
    store::ProgressStore,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub catalog: Arc<ContentCatalog>,
    /// Shared store for cohort users.
    pub remote_store: Arc<dyn ProgressStore>,
    /// Device store for standalone users.
    pub device_store: Arc<dyn ProgressStore>,
    pub sessions: Arc<SessionRegistry>,
    pub selector: Arc<ProblemSelector>,
    pub reporter: Arc<dyn ScoreReporter>,
}

impl AppState {
    pub fn store_for(&self, ctx: &SessionContext) -> Arc<dyn ProgressStore> {
        if ctx.mode.is_cohort() {
            self.remote_store.clone()
        } else {
            self.device_store.clone()
        }
    }

    pub fn lesson_deps(&self, ctx: &SessionContext) -> LessonDeps {
        LessonDeps {
            catalog: self.catalog.clone(),
            selector: self.selector.clone(),
            store: self.store_for(ctx),
            reporter: self.reporter.clone(),
        }
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for Arc<ContentCatalog> {
    fn from_ref(state: &AppState) -> Self {
        state.catalog.clone()
    }
}
