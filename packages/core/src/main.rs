use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;
use tokio_util::sync::CancellationToken;

use utility_thresholds::{
    alerts::{publisher::WsChangePublisher, webhook::WebhookBreachNotifier},
    api::{self, ApiState},
    cli::Cli,
    config::Config,
    db,
    error::AppError,
    logging::init_logging,
    metrics::AppMetrics,
    repository::SqliteThresholdRepository,
    scheduler,
    services::ids::UuidIdGenerator,
    store::InMemoryThresholdStore,
    thresholds::{
        ConsumptionEvaluator, ThresholdMonitor, ThresholdRepository, ThresholdResetter,
        ThresholdService,
    },
};

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();

    if let Err(err) = run().await {
        tracing::error!("{}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let config = Config::from_env()
        .and_then(|config| config.with_cli(&cli))
        .map_err(AppError::Config)?;

    tracing::info!("Service starting with config: {:?}", config);

    let repository: Arc<dyn ThresholdRepository> = if config.in_memory {
        tracing::warn!("Running with in-memory threshold storage; nothing is persisted");
        Arc::new(InMemoryThresholdStore::new())
    } else {
        let pool = db::create_pool(&config.database_url).await?;
        Arc::new(SqliteThresholdRepository::new(pool))
    };

    let metrics = Arc::new(AppMetrics::new()?);

    let breach_notifier = Arc::new(WebhookBreachNotifier::new(
        &config.alert_service_uri,
        config.alert_timeout,
    ));
    let evaluator = ConsumptionEvaluator::new(repository.clone())
        .with_notifier(breach_notifier)
        .with_metrics(metrics.clone());

    let monitor = ThresholdMonitor::new(
        repository.clone(),
        Arc::new(WsChangePublisher::new(config.monitoring_service_uri.clone())),
        config.monitoring_interval,
    )
    .with_metrics(metrics.clone());

    monitor.start().await;

    let shutdown = CancellationToken::new();
    let resetter = ThresholdResetter::new(repository.clone()).with_metrics(metrics.clone());
    let schedule = scheduler::reset_schedule()
        .map_err(|err| AppError::Config(format!("invalid reset schedule: {}", err)))?;
    let reset_task = tokio::spawn(scheduler::run_daily_reset(
        resetter,
        schedule,
        shutdown.clone(),
    ));

    let app = api::create_router(ApiState {
        thresholds: ThresholdService::new(repository.clone(), Arc::new(UuidIdGenerator)),
        evaluator,
        metrics,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| AppError::Network(format!("failed to bind {}: {}", addr, err)))?;
    tracing::info!("HTTP server listening on {}", addr);

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", err);
            }
            tracing::info!("Shutdown signal received");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Err(err) = monitor.stop().await {
        tracing::warn!("Change monitor did not stop cleanly: {}", err);
    }
    if let Err(err) = reset_task.await {
        tracing::warn!("Reset scheduler task failed: {}", err);
    }

    tracing::info!("Service stopped cleanly");
    Ok(())
}
