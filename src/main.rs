//! `tasker-cli`: submit tasks, tick a task, inspect its execution context, or
//! run the in-process worker loop against a configured Postgres database.
//! No library code lives at the workspace root — this binary only wires
//! together `tasker-shared`, `tasker-orchestration`, and `tasker-worker`.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use uuid::Uuid;

use tasker_orchestration::coordinator::{CoordinatorConfig, OrchestrationCoordinator};
use tasker_orchestration::events::EventBus;
use tasker_orchestration::initializer::{TaskInitializer, TaskSubmission};
use tasker_orchestration::reenqueue::InProcessReenqueuer;
use tasker_orchestration::registry::HandlerRegistry;
use tasker_shared::config::TaskerConfig;
use tasker_shared::identity::Sha256FieldHashStrategy;
use tasker_worker::handlers::EchoHandler;
use tasker_worker::WorkerLoop;

#[derive(Parser)]
#[command(name = "tasker-cli", about = "Durable workflow engine CLI")]
struct Cli {
    #[arg(long, default_value = "config/base.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a new task from a named task template.
    Submit {
        #[arg(long)]
        namespace: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value_t = 1)]
        version: i32,
        #[arg(long)]
        context: Option<String>,
    },
    /// Run one tick (Discover/Execute/Finalize cycle, bounded) for a task.
    Tick {
        #[arg(long)]
        task_uuid: Uuid,
    },
    /// Print the task's current Execution Context as JSON.
    Inspect {
        #[arg(long)]
        task_uuid: Uuid,
    },
    /// Run the worker loop: poll non-terminal tasks and tick each, using
    /// `EchoHandler` for every named step found in the database.
    Serve {
        #[arg(long, default_value_t = 2)]
        poll_interval_seconds: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = TaskerConfig::load(Some(&cli.config))?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(config.logging.level.clone()))
        .json()
        .init();

    let pool = tasker_shared::database::connect(&config.database).await?;
    tasker_shared::database::migrate(&pool).await?;

    let bus = Arc::new(EventBus::new());
    let registry = Arc::new(HandlerRegistry::new());

    // The CLI's `serve` worker loop already re-polls every non-terminal task
    // on a fixed interval, so a task waiting out backoff is picked up again
    // on the next poll regardless; `InProcessReenqueuer`'s faster wake-up is
    // left to callers embedding the orchestration crate directly (see its
    // integration tests) rather than wired into this CLI demo.
    let reenqueuer: Arc<dyn tasker_orchestration::reenqueue::Reenqueuer> =
        Arc::new(InProcessReenqueuer::new(|_task_uuid: Uuid| {}));

    let coordinator_config = CoordinatorConfig {
        worker_pool_size: config.execution.worker_pool_size,
        finalizer_max_inline_iterations: config.execution.finalizer_max_inline_iterations,
        default_retry_limit: config.execution.default_retry_limit,
        default_retryable: config.execution.default_retryable,
        backoff_cap_seconds: config.execution.backoff_cap_seconds,
        reenqueue_min_delay_seconds: config.execution.reenqueue_min_delay_seconds,
        reenqueue_max_delay_seconds: config.execution.reenqueue_max_delay_seconds,
    };
    let coordinator = Arc::new(OrchestrationCoordinator::new(
        pool.clone(),
        bus.clone(),
        registry.clone(),
        reenqueuer,
        coordinator_config,
    ));

    match cli.command {
        Command::Submit {
            namespace,
            name,
            version,
            context,
        } => {
            let identity_strategy = Sha256FieldHashStrategy;
            let context_value = context.map(|raw| serde_json::from_str(&raw)).transpose()?;
            let initializer = TaskInitializer::new(
                pool.clone(),
                bus.clone(),
                &identity_strategy,
                &config.execution.identity_fields,
            );
            let task_uuid = initializer
                .submit_task(TaskSubmission {
                    namespace,
                    name,
                    version,
                    context: context_value,
                    initiator: None,
                    source_system: None,
                    reason: None,
                    tags: None,
                })
                .await?;
            println!("{task_uuid}");
        }
        Command::Tick { task_uuid } => {
            let action = coordinator.process_task(task_uuid).await?;
            println!("{action:?}");
        }
        Command::Inspect { task_uuid } => {
            let readiness_defaults = tasker_orchestration::readiness::ReadinessDefaults {
                default_retry_limit: config.execution.default_retry_limit,
                default_retryable: config.execution.default_retryable,
                backoff_cap_seconds: config.execution.backoff_cap_seconds,
            };
            let oracle = tasker_orchestration::readiness::ReadinessOracle::new(&pool, readiness_defaults);
            let aggregator = tasker_orchestration::aggregator::ExecutionContextAggregator::new(&pool, &oracle);
            let ctx = aggregator.context_for(task_uuid).await?;
            println!("{}", serde_json::to_string_pretty(&ctx)?);
        }
        Command::Serve { poll_interval_seconds } => {
            register_echo_handlers(&pool, &registry).await?;
            let worker_loop = WorkerLoop::new(
                pool.clone(),
                coordinator.clone(),
                Duration::from_secs(poll_interval_seconds),
            );
            let cancellation = tokio_util::sync::CancellationToken::new();
            worker_loop.run(cancellation).await;
        }
    }

    Ok(())
}

/// Demo wiring: registers `EchoHandler` for every `(dependent_system, named_step)`
/// pair currently in the database, so `serve` can drive arbitrary
/// previously-submitted tasks without a domain-specific handler crate.
async fn register_echo_handlers(
    pool: &sqlx::PgPool,
    registry: &HandlerRegistry,
) -> anyhow::Result<()> {
    let pairs: Vec<(String, String)> = sqlx::query_as(
        r#"
        SELECT ds.name, ns.name
        FROM tasker.named_steps ns
        JOIN tasker.dependent_systems ds ON ds.dependent_system_uuid = ns.dependent_system_uuid
        "#,
    )
    .fetch_all(pool)
    .await?;

    for (dependent_system, step_name) in pairs {
        registry.register((dependent_system, step_name, 1), Arc::new(EchoHandler))?;
    }
    tracing::info!(handlers = registry.len(), "registered demo handlers");
    Ok(())
}
