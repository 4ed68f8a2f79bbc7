use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use tokio::sync::Notify;

use crate::adapters::api::{ApiState, configure_routes};
use crate::adapters::central_http::{CentralClient, ReqwestTransport};
use crate::app::config::AppConfig;
use crate::app::error::AppError;
use crate::app::scheduler::{CentralUrl, RefreshEngine, Scheduler, SystemClock};
use crate::app::snapshot::{LogSink, SnapshotSink, SnapshotStore};

fn build_scheduler<S>(
    config: &AppConfig,
    central_url: CentralUrl,
    sink: S,
) -> Result<Scheduler<ReqwestTransport, S, SystemClock>, AppError>
where
    S: SnapshotSink,
{
    let transport = ReqwestTransport::new(Duration::from_millis(config.http_timeout_ms))?;

    Ok(Scheduler::new(RefreshEngine::new(
        CentralClient::new(transport),
        central_url,
        sink,
        SystemClock,
    )))
}

pub fn run(config: AppConfig) -> Result<(), AppError> {
    let central_url = CentralUrl::new(config.central_url.as_deref());
    let (store, reader) = SnapshotStore::channel();
    let scheduler = build_scheduler(&config, central_url.clone(), store)?;
    let period = Duration::from_millis(config.refresh_interval_ms);

    actix_web::rt::System::new().block_on(async move {
        let shutdown = Arc::new(Notify::new());
        let scheduler_handle =
            tokio::spawn(scheduler.clone().run(period, Arc::clone(&shutdown)));

        let api_state = ApiState {
            snapshots: reader,
            central_url,
            refresher: Arc::new(scheduler),
        };

        tracing::info!(bind = %config.http_bind, "http server starting");

        let server_result = async {
            HttpServer::new(move || {
                App::new()
                    .wrap(Cors::permissive())
                    .app_data(web::Data::new(api_state.clone()))
                    .configure(configure_routes)
            })
            .bind(&config.http_bind)?
            .run()
            .await
        }
        .await;

        shutdown.notify_one();
        scheduler_handle
            .await
            .map_err(|err| AppError::Scheduler(err.to_string()))?;

        server_result.map_err(AppError::from)
    })
}

pub fn run_service(config: AppConfig) -> Result<(), AppError> {
    let central_url = CentralUrl::new(config.central_url.as_deref());
    let scheduler = build_scheduler(&config, central_url, LogSink)?;
    let period = Duration::from_millis(config.refresh_interval_ms);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let shutdown = Arc::new(Notify::new());
        let scheduler_handle = tokio::spawn(scheduler.run(period, Arc::clone(&shutdown)));

        tokio::signal::ctrl_c().await?;
        tracing::info!("shutdown requested");

        shutdown.notify_one();
        scheduler_handle
            .await
            .map_err(|err| AppError::Scheduler(err.to_string()))
    })
}
