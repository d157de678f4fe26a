use crate::cli::ServeArgs;
use crate::infra::{build_codec, AppState};
use crate::routes::with_intake_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use taxforms::config::AppConfig;
use taxforms::error::AppError;
use taxforms::intake::{
    FilesystemDocumentStorage, InMemoryIntakeStore, LoggingOtpDelivery, TaxFormService,
};
use taxforms::telemetry;
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

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let codec = build_codec(&config.security)?;
    let repository = Arc::new(InMemoryIntakeStore::default());
    let storage = Arc::new(FilesystemDocumentStorage::new(
        config.storage.media_root.clone(),
    ));
    let otp = Arc::new(LoggingOtpDelivery);
    let intake_service = Arc::new(TaxFormService::new(repository, storage, otp, codec));

    let app = with_intake_routes(intake_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        media_root = %config.storage.media_root.display(),
        "tax form intake service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
