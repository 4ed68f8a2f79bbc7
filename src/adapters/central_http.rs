use std::future::Future;
use std::time::Duration;

use reqwest::header::{CACHE_CONTROL, HeaderMap, HeaderValue, PRAGMA};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Upstream collections polled every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Section {
    ChargePoints,
    Sessions,
    Drivers,
    Alerts,
    Audit,
}

impl Section {
    pub fn path(self) -> &'static str {
        match self {
            Self::ChargePoints => "/api/cps",
            Self::Sessions => "/api/sessions",
            Self::Drivers => "/api/drivers",
            Self::Alerts => "/api/alerts",
            Self::Audit => "/api/audit",
        }
    }

    /// Older central builds only expose the CP list under `/api/status`.
    pub fn fallback_path(self) -> Option<&'static str> {
        match self {
            Self::ChargePoints => Some("/api/status"),
            _ => None,
        }
    }

    /// Optional sections are features the central may not offer at all.
    pub fn is_optional(self) -> bool {
        matches!(self, Self::Alerts | Self::Audit)
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("{url} answered with HTTP {status}")]
    HttpStatus { url: String, status: u16 },
    #[error("{url} returned a body that is not JSON: {message}")]
    Decode { url: String, message: String },
}

/// Result of fetching one endpoint. `Absent` is an ordinary outcome that
/// callers treat like an empty collection.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    Items(Vec<Value>),
    Absent(FetchError),
}

impl Fetched {
    pub fn into_items(self) -> Vec<Value> {
        match self {
            Self::Items(items) => items,
            Self::Absent(_) => Vec::new(),
        }
    }
}

pub trait CentralTransport: Send + Sync + 'static {
    fn get_json(&self, url: &str) -> impl Future<Output = Result<Value, FetchError>> + Send;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self { client })
    }
}

impl CentralTransport for ReqwestTransport {
    async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        let transport_error = |error: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            message: error.to_string(),
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(transport_error)?;
        serde_json::from_slice(&body).map_err(|error| FetchError::Decode {
            url: url.to_string(),
            message: error.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct CentralClient<T> {
    transport: T,
}

impl<T> CentralClient<T>
where
    T: CentralTransport,
{
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub async fn fetch_section(&self, base_url: &str, section: Section) -> Fetched {
        self.fetch(base_url, section.path(), section.fallback_path())
            .await
    }

    /// Tries `path`, then `fallback` once if configured. No further retries;
    /// the next scheduler tick is the retry.
    pub async fn fetch(&self, base_url: &str, path: &str, fallback: Option<&str>) -> Fetched {
        let primary_url = join_url(base_url, path);
        let primary_error = match self.transport.get_json(&primary_url).await {
            Ok(body) => return Fetched::Items(unwrap_items(body)),
            Err(error) => error,
        };

        let Some(fallback) = fallback else {
            return Fetched::Absent(primary_error);
        };

        tracing::debug!(
            error = %primary_error,
            fallback,
            "primary endpoint failed, trying fallback"
        );

        match self.transport.get_json(&join_url(base_url, fallback)).await {
            Ok(body) => Fetched::Items(unwrap_items(body)),
            Err(error) => Fetched::Absent(error),
        }
    }
}

pub fn join_url(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

/// Accepts a bare array or an `{items: [...]}` envelope. Any other shape
/// carries no records.
pub fn unwrap_items(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(mut object) => match object.remove("items") {
            Some(Value::Array(items)) => items,
            _ => {
                tracing::debug!("response object has no items array");
                Vec::new()
            }
        },
        _ => Vec::new(),
    }
}
