use crate::app::AppError;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub central_url: Option<String>,
    pub refresh_interval_ms: u64,
    pub http_timeout_ms: u64,
    pub http_bind: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            central_url: lookup("CENTRAL_URL")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .filter(|v| !v.is_empty()),
            refresh_interval_ms: parse_positive_or_default(&lookup, "REFRESH_INTERVAL_MS", 2000)?,
            http_timeout_ms: parse_positive_or_default(&lookup, "HTTP_TIMEOUT_MS", 5000)?,
            http_bind: lookup("HTTP_BIND")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "0.0.0.0:8090".to_string()),
        })
    }
}

fn parse_positive_or_default<F>(lookup: &F, key: &str, default: u64) -> Result<u64, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(0) => Err(AppError::config(format!("{key} must be greater than zero"))),
            Ok(value) => Ok(value),
            Err(_) => Err(AppError::config(format!("{key} must be a valid number"))),
        },
        None => Ok(default),
    }
}
