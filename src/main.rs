// src/main.rs

use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use tutor_backend::config::{Config, SESSION_REAPER_INTERVAL_SECS};
use tutor_backend::routes;
use tutor_backend::selection::{LeastMasteredFirst, ProblemSelector};
use tutor_backend::services::{
    catalog::ContentCatalog,
    passback::{DisabledReporter, MiddlewareClient, ScoreReporter},
    registry::{SessionRegistry, spawn_reaper},
};
use tutor_backend::state::AppState;
use tutor_backend::store::{ProgressStore, local::LocalStore, postgres::PgStore};

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenv().ok();

    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    let catalog = ContentCatalog::load(&config.content_dir)
        .await
        .expect("Failed to load lesson content");

    let device_store: Arc<dyn ProgressStore> = Arc::new(
        LocalStore::open(&config.device_store_path)
            .await
            .expect("Failed to open device store"),
    );

    let remote_store: Arc<dyn ProgressStore> = match &config.database_url {
        Some(url) => {
            let pool = connect_with_retry(url).await;

            // Run Migrations Automatically
            tracing::info!("Running migrations...");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Migrations applied successfully.");

            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, cohort progress is kept in the device store");
            device_store.clone()
        }
    };

    let reporter: Arc<dyn ScoreReporter> = match &config.middleware_url {
        Some(url) => Arc::new(MiddlewareClient::new(url.clone())),
        None => {
            tracing::warn!("MIDDLEWARE_URL not set, score passback is disabled");
            Arc::new(DisabledReporter)
        }
    };

    let sessions = Arc::new(SessionRegistry::new());
    let _reaper = spawn_reaper(
        sessions.clone(),
        Duration::from_secs(config.session_idle_secs),
        Duration::from_secs(SESSION_REAPER_INTERVAL_SECS),
    );

    // Create AppState
    let state = AppState {
        selector: Arc::new(ProblemSelector::new(
            config.mastery_threshold,
            Arc::new(LeastMasteredFirst),
        )),
        config: config.clone(),
        catalog: Arc::new(catalog),
        remote_store,
        device_store,
        sessions,
        reporter,
    };

    // Create the Axum application router
    let app = routes::create_router(state);

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .expect("Failed to bind listening address");

    // Start the server
    axum::serve(listener, app).await.expect("Server error");
}

/// Initialize Database Pool with Retry
async fn connect_with_retry(url: &str) -> PgPool {
    let mut retry_count = 0;
    loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(url)
            .await
        {
            Ok(pool) => {
                tracing::info!("Database connected...");
                return pool;
            }
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    panic!("Failed to connect to database after 5 retries: {}", e);
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}
