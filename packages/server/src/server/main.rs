// Main entry point for the job worker

use std::sync::Arc;

use anyhow::{Context, Result};
use intake_core::domains::assessments::{register_handlers, AssessmentServices};
use intake_core::kernel::jobs::{HandlerRegistry, JobStore, PostgresJobStore};
use intake_core::kernel::{IntakeApiClient, OpenAIClient};
use intake_core::server::{
    build_dispatcher, build_processor, build_worker_app, spawn_redispatch_loop, WorkerState,
    PROCESS_JOB_PATH,
};
use intake_core::Config;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,intake_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting risk intake job worker");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(environment = %config.environment, "Configuration loaded");

    let database_url = config
        .database_url
        .clone()
        .context("DATABASE_URL must be set")?;
    let intake_api_url = config
        .intake_api_url
        .clone()
        .context("INTAKE_API_URL must be set")?;
    let openai_api_key = config
        .openai_api_key
        .clone()
        .context("OPENAI_API_KEY must be set")?;

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // Run migrations
    tracing::info!("Running database migrations...");
    let job_store = PostgresJobStore::new(pool);
    job_store.migrate().await?;
    tracing::info!("Migrations complete");

    // Handlers and their collaborators
    let intake_api = Arc::new(IntakeApiClient::new(
        intake_api_url,
        config.intake_api_token.clone(),
    ));
    let ai = Arc::new(OpenAIClient::new(openai_api_key, config.openai_model.clone()));
    let services = Arc::new(AssessmentServices::new(
        intake_api.clone(),
        intake_api.clone(),
        ai,
        intake_api,
    ));
    let mut registry = HandlerRegistry::new();
    register_handlers(&mut registry, services);
    tracing::info!(job_types = ?registry.registered_types(), "Job handlers registered");

    // Job engine
    let store: Arc<dyn JobStore> = Arc::new(job_store);
    let processor = Arc::new(build_processor(&config, store.clone(), Arc::new(registry)));
    let dispatcher = Arc::new(build_dispatcher(&config, store, processor.clone()));
    let _redispatch = spawn_redispatch_loop(dispatcher, config.redispatch_interval);

    // Build application
    let app = build_worker_app(WorkerState { processor });

    // Start server
    let addr = format!("0.0.0.0:{}", config.worker_port);
    tracing::info!("Starting worker on {}", addr);
    tracing::info!("Job endpoint: http://localhost:{}{}", config.worker_port, PROCESS_JOB_PATH);
    tracing::info!("Health check: http://localhost:{}/health", config.worker_port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
