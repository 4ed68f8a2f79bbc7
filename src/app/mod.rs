mod config;
mod error;
mod logging;
mod runtime;
pub mod scheduler;
pub mod snapshot;

pub use config::AppConfig;
pub use error::AppError;

/// Scheduler plus the read-only HTTP view.
pub fn run() -> Result<(), AppError> {
    let config = bootstrap()?;
    runtime::run(config)
}

/// Scheduler only; each snapshot is written to the log.
pub fn run_service() -> Result<(), AppError> {
    let config = bootstrap()?;
    runtime::run_service(config)
}

fn bootstrap() -> Result<AppConfig, AppError> {
    let _ = dotenvy::dotenv();
    logging::init()?;

    let config = AppConfig::from_env()?;

    tracing::info!(
        central_url = config.central_url.as_deref().unwrap_or("<unset>"),
        refresh_interval_ms = config.refresh_interval_ms,
        http_timeout_ms = config.http_timeout_ms,
        http_bind = %config.http_bind,
        "application bootstrap initialized"
    );

    Ok(config)
}
