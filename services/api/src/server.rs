use crate::cli::ServeArgs;
use crate::infra::{
    decision_config, AppState, InMemoryDecisionRepository, InMemoryFactProvider,
    LoggingQueueDispatcher, StubRiskScorer,
};
use crate::routes::with_service_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

use decisioning::config::AppConfig;
use decisioning::error::AppError;
use decisioning::telemetry;
use decisioning::workflows::eligibility::{DecisionService, RuleStore};

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

    let store = Arc::new(RuleStore::new());
    let provider = Arc::new(InMemoryFactProvider::default());
    let repository = Arc::new(InMemoryDecisionRepository::default());
    let dispatcher = Arc::new(LoggingQueueDispatcher);
    let service = Arc::new(DecisionService::new(
        store,
        provider,
        Arc::new(StubRiskScorer),
        repository,
        dispatcher,
        decision_config(&config.decisioning),
    ));

    let app = with_service_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "scheme decisioning service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
