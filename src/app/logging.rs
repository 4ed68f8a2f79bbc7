use tracing_subscriber::{EnvFilter, fmt};

use crate::app::AppError;

// Polling every few seconds makes connection-level logs from the HTTP stack noisy.
const DEFAULT_FILTER: &str = "info,hyper=warn,hyper_util=warn,reqwest=warn,actix_server=warn";

pub fn init() -> Result<(), AppError> {
    fmt()
        .with_env_filter(filter_from_env())
        .with_target(true)
        .try_init()
        .map_err(AppError::logging_init)
}

fn filter_from_env() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::EnvFilter;

    use super::DEFAULT_FILTER;

    #[test]
    fn default_filter_is_valid() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
