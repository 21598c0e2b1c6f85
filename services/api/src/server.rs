use crate::cli::ServeArgs;
use crate::infra::{compute_assets, load_hospitals, AppState};
use crate::routes::with_job_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use medchain::compute::build_provider;
use medchain::config::AppConfig;
use medchain::error::AppError;
use medchain::jobs::{JobOrchestrator, JobRegistry};
use medchain::matching::HospitalSource;
use medchain::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let hospitals = load_hospitals(config.assets.hospitals_path.as_deref())?.snapshot()?;
    let assets = compute_assets(&config.compute, &config.assets, &hospitals)?;
    let provider = build_provider(&config.compute)?;
    let orchestrator = Arc::new(JobOrchestrator::new(
        provider,
        Arc::new(JobRegistry::new()),
        assets,
        config.compute.poll_policy(),
    ));

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        backend: config.compute.backend,
        compute_endpoint: config.compute.endpoint().to_string(),
    };

    let app = with_job_routes(orchestrator)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        backend = %config.compute.backend,
        endpoint = config.compute.endpoint(),
        hospitals = hospitals.len(),
        poll_interval_secs = config.compute.poll_interval.as_secs(),
        max_attempts = config.compute.max_attempts,
        "emergency matching service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
