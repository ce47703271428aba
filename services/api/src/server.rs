use crate::cli::ServeArgs;
use crate::infra::{job_directory, AppState};
use crate::routes::with_application_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;
use veritrust::config::AppConfig;
use veritrust::error::AppError;
use veritrust::telemetry;
use veritrust::workflows::applications::{ApplicationService, InMemoryApplicationStore};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(InMemoryApplicationStore::new(&config.store));
    let jobs = Arc::new(job_directory(args.seed_jobs));
    let application_service = Arc::new(ApplicationService::new(store, jobs));

    let app = with_application_routes(application_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        subscription_capacity = config.store.subscription_capacity,
        seeded_jobs = args.seed_jobs,
        "application review service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
