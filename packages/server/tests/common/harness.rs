//! Test harnesses for job engine integration tests.
//!
//! `TestHarness` wires the engine over the in-memory store and needs nothing
//! external. `PostgresHarness` runs against a shared Postgres container that
//! is started once per test binary and reused.

use std::sync::{Arc, Once};
use std::time::Duration;

use anyhow::{Context, Result};
use intake_core::config::Environment;
use intake_core::kernel::jobs::{
    HandlerRegistry, InMemoryJobStore, Job, JobDispatcher, JobInvoker, JobProcessor, JobStore,
    PostgresJobStore,
};
use sqlx::PgPool;
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

static TRACING: Once = Once::new();

/// Initialize tracing subscriber to respect RUST_LOG environment variable.
/// Run tests with: RUST_LOG=debug cargo test -- --nocapture
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info,intake_core=debug".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// The engine pieces a test drives.
pub struct TestEngine {
    pub store: Arc<InMemoryJobStore>,
    pub processor: Arc<JobProcessor>,
    pub dispatcher: JobDispatcher,
}

/// In-memory harness.
///
/// # Example using test-context
///
/// ```ignore
/// use test_context::test_context;
///
/// #[test_context(TestHarness)]
/// #[tokio::test]
/// async fn my_test(ctx: &mut TestHarness) {
///     let engine = ctx.engine(HandlerRegistry::new());
///     // ... test code
/// }
/// ```
pub struct TestHarness {
    pub owner_id: Uuid,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        init_test_tracing();
        Self {
            owner_id: Uuid::new_v4(),
        }
    }

    async fn teardown(self) {}
}

impl TestHarness {
    /// Engine that runs jobs in-process, as in development.
    pub fn engine(&self, registry: HandlerRegistry) -> TestEngine {
        self.build(registry, None, Environment::Test)
    }

    /// Engine that hands jobs to `invoker`, as in production.
    pub fn remote_engine(
        &self,
        registry: HandlerRegistry,
        invoker: Arc<dyn JobInvoker>,
    ) -> TestEngine {
        self.build(registry, Some(invoker), Environment::Production)
    }

    fn build(
        &self,
        registry: HandlerRegistry,
        invoker: Option<Arc<dyn JobInvoker>>,
        environment: Environment,
    ) -> TestEngine {
        let store = InMemoryJobStore::arc();
        let processor = Arc::new(JobProcessor::new(store.clone(), Arc::new(registry)));
        let dispatcher = JobDispatcher::new(store.clone(), processor.clone(), invoker, environment);
        TestEngine {
            store,
            processor,
            dispatcher,
        }
    }
}

/// Poll until the job reaches a terminal status.
pub async fn wait_for_terminal(store: &dyn JobStore, id: Uuid) -> Job {
    for _ in 0..200 {
        if let Some(job) = store.find_by_id(id).await.unwrap() {
            if job.status.is_terminal() {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {} never reached a terminal status", id);
}

// =============================================================================
// Postgres
// =============================================================================

/// Shared test infrastructure that persists across all tests.
struct SharedTestInfra {
    db_url: String,
    // Keep the container alive for the entire test run
    _postgres: ContainerAsync<Postgres>,
}

/// Global shared infrastructure - initialized once, reused by all tests.
static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        init_test_tracing();

        let postgres = Postgres::default()
            .with_tag("16")
            .start()
            .await
            .context("Failed to start Postgres container")?;

        let pg_host = postgres.get_host().await?;
        let pg_port = postgres.get_host_port_ipv4(5432).await?;
        let db_url = format!(
            "postgresql://postgres:postgres@{}:{}/postgres",
            pg_host, pg_port
        );

        // Run migrations once on the shared database
        let pool = PgPool::connect(&db_url)
            .await
            .context("Failed to connect to Postgres for migrations")?;
        PostgresJobStore::new(pool).migrate().await?;

        Ok(Self {
            db_url,
            _postgres: postgres,
        })
    }

    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async {
                Self::init()
                    .await
                    .expect("Failed to initialize shared test infrastructure")
            })
            .await
    }
}

/// Harness over a real Postgres job store. Requires Docker.
pub struct PostgresHarness {
    pub store: PostgresJobStore,
    pub owner_id: Uuid,
}

impl AsyncTestContext for PostgresHarness {
    async fn setup() -> Self {
        let infra = SharedTestInfra::get().await;
        let pool = PgPool::connect(&infra.db_url)
            .await
            .expect("Failed to connect to test database");
        Self {
            store: PostgresJobStore::new(pool),
            owner_id: Uuid::new_v4(),
        }
    }

    async fn teardown(self) {
        // Pool is dropped with the harness
    }
}
