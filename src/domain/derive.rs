use chrono::{DateTime, Utc};

use crate::domain::models::{
    Alert, AlertKind, ChargePoint, CpState, WeatherObservation, WeatherStatus,
};

pub const HEARTBEAT_LAG_THRESHOLD_MS: u64 = 5_000;
pub const WEATHER_SERVICE_SOURCE: &str = "weather-service";

const OBSERVED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%SZ";

/// Everything computed from one cycle's charge point collection.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedViews {
    pub alerts: Vec<Alert>,
    pub weather: Vec<WeatherObservation>,
    pub weather_status: WeatherStatus,
}

pub fn derive_views(cps: &[ChargePoint], cycle_at: DateTime<Utc>) -> DerivedViews {
    let weather_status = weather_status(cps);
    let mut alerts = derive_alerts(cps, cycle_at);

    if weather_status == WeatherStatus::NoData {
        alerts.push(Alert {
            timestamp: cycle_at,
            kind: AlertKind::Weather,
            source: WEATHER_SERVICE_SOURCE.to_string(),
            message: "central has not received weather data for any CP".to_string(),
        });
    }

    DerivedViews {
        alerts,
        weather: derive_weather(cps),
        weather_status,
    }
}

/// Explicit upstream flag when present, otherwise freezing temperature.
pub fn weather_alert(cp: &ChargePoint) -> bool {
    cp.weather_alert_explicit
        .unwrap_or_else(|| cp.temperature_c.is_some_and(|temp| temp < 0.0))
}

/// Builds the published collection with the effective weather flag on each CP.
pub fn resolve_weather_flags(cps: Vec<ChargePoint>) -> Vec<ChargePoint> {
    cps.into_iter()
        .map(|cp| ChargePoint {
            weather_alert: weather_alert(&cp),
            ..cp
        })
        .collect()
}

pub fn derive_alerts(cps: &[ChargePoint], cycle_at: DateTime<Utc>) -> Vec<Alert> {
    let mut alerts = Vec::new();

    for cp in cps {
        let mut push = |kind: AlertKind, message: String| {
            alerts.push(Alert {
                timestamp: cycle_at,
                kind,
                source: cp.id.clone(),
                message,
            });
        };

        match cp.state {
            CpState::Broken => push(AlertKind::CpState, "state BROKEN".to_string()),
            CpState::Disconnected => push(
                AlertKind::CpState,
                "state DISCONNECTED (no heartbeats)".to_string(),
            ),
            CpState::Stopped => push(AlertKind::CpState, "CP stopped".to_string()),
            _ => {}
        }

        // a disconnected CP's lag is stale and already explained by its state
        if cp.heartbeat_lag_ms > HEARTBEAT_LAG_THRESHOLD_MS && cp.state != CpState::Disconnected {
            push(
                AlertKind::Heartbeat,
                format!("heartbeat delayed ({} ms)", cp.heartbeat_lag_ms),
            );
        }

        if weather_alert(cp) {
            let message = match cp.temperature_c {
                Some(temp) => format!("weather alert (temp={temp:.2}°C)"),
                None => "weather alert".to_string(),
            };
            push(AlertKind::Weather, message);
        }
    }

    alerts
}

pub fn derive_weather(cps: &[ChargePoint]) -> Vec<WeatherObservation> {
    cps.iter()
        .filter(|cp| cp.state != CpState::Disconnected)
        .filter_map(|cp| {
            let alert = weather_alert(cp);
            if cp.temperature_c.is_none() && !alert {
                return None;
            }

            Some(WeatherObservation {
                cp_id: cp.id.clone(),
                city: cp.location.clone(),
                temperature_c: cp.temperature_c,
                alert,
                observed_at: cp
                    .weather_observed_at
                    .map(|at| at.format(OBSERVED_AT_FORMAT).to_string()),
            })
        })
        .collect()
}

pub fn weather_status(cps: &[ChargePoint]) -> WeatherStatus {
    if cps.is_empty() {
        return WeatherStatus::NoCps;
    }

    let any_alert = cps.iter().any(weather_alert);
    let any_data = any_alert || cps.iter().any(|cp| cp.temperature_c.is_some());

    if !any_data {
        WeatherStatus::NoData
    } else if any_alert {
        WeatherStatus::Alert
    } else {
        WeatherStatus::Ok
    }
}
