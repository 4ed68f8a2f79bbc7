use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CpState {
    Available,
    Charging,
    Stopped,
    Broken,
    Disconnected,
    Unknown,
}

impl CpState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Charging => "CHARGING",
            Self::Stopped => "STOPPED",
            Self::Broken => "BROKEN",
            Self::Disconnected => "DISCONNECTED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Canonical charging point, rebuilt from the upstream payload every cycle.
///
/// `weather_alert` is the effective flag once the cycle has run
/// [`crate::domain::derive::resolve_weather_flags`]; until then it only echoes
/// the upstream flag kept in `weather_alert_explicit`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargePoint {
    pub id: String,
    pub location: String,
    pub state: CpState,
    pub occupied: bool,
    pub stopped: bool,
    pub heartbeat_lag_ms: u64,
    pub session_id: Option<String>,
    pub driver_id: Option<String>,
    pub energy_kwh: f64,
    pub cost_eur: f64,
    pub price_eur_per_kwh: f64,
    pub temperature_c: Option<f64>,
    pub weather_alert: bool,
    #[serde(skip)]
    pub weather_alert_explicit: Option<bool>,
    pub weather_observed_at: Option<DateTime<Utc>>,
    pub registered: Option<bool>,
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    pub id: String,
    pub vehicle: Option<String>,
    pub state: Option<String>,
    pub assigned_cp_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub cp_id: Option<String>,
    pub driver_id: Option<String>,
    pub started_at_utc: Option<DateTime<Utc>>,
    pub energy_kwh: f64,
    pub cost_eur: f64,
}

/// Alert item as sent by `/api/alerts`, displayed next to the derived set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamAlert {
    pub timestamp: Option<DateTime<Utc>>,
    pub kind: Option<String>,
    pub source: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub timestamp: Option<DateTime<Utc>>,
    pub source_ip: Option<String>,
    pub action: Option<String>,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    CpState,
    Heartbeat,
    Weather,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub timestamp: DateTime<Utc>,
    pub kind: AlertKind,
    pub source: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherObservation {
    pub cp_id: String,
    pub city: String,
    pub temperature_c: Option<f64>,
    pub alert: bool,
    pub observed_at: Option<String>,
}

/// Fleet-level weather indicator, in evaluation precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WeatherStatus {
    NoCps,
    NoData,
    Alert,
    Ok,
}
