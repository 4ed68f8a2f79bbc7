use thiserror::Error;

/// Startup and process-level failures. Nothing a refresh cycle does ends up here.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to build central HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("refresh scheduler stopped abnormally: {0}")]
    Scheduler(String),
}

impl AppError {
    pub fn logging_init<E: std::fmt::Display>(error: E) -> Self {
        Self::LoggingInit(error.to_string())
    }

    pub fn config<E: std::fmt::Display>(error: E) -> Self {
        Self::Config(error.to_string())
    }
}
