use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::models::{AuditEntry, ChargePoint, CpState, Driver, Session, UpstreamAlert};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    ChargePoint,
    Driver,
    Session,
    UpstreamAlert,
    AuditEntry,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ChargePoint => "charge point",
            Self::Driver => "driver",
            Self::Session => "session",
            Self::UpstreamAlert => "upstream alert",
            Self::AuditEntry => "audit entry",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    #[error("item must be a JSON object")]
    NotAnObject,
    #[error("no identifier under any of: {}", .0.join("|"))]
    MissingIdentifier(&'static [&'static str]),
}

/// A single upstream item that could not be turned into a canonical record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MalformedRecord {
    pub entity: EntityKind,
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Normalized<T> {
    pub records: Vec<T>,
    pub malformed: Vec<MalformedRecord>,
}

/// A canonical entity that can be built from one raw upstream item.
pub trait Canonical: Sized {
    const KIND: EntityKind;

    fn from_raw(object: &Map<String, Value>) -> Result<Self, NormalizeError>;
}

const CP_ID_KEYS: &[&str] = &["cp", "id", "cpID"];
const CP_LOCATION_KEYS: &[&str] = &["loc", "location", "ubicacion"];
const CP_STATE_KEYS: &[&str] = &["estado", "status", "state"];
const CP_OCCUPIED_KEYS: &[&str] = &["ocupado", "occupied"];
const CP_STOPPED_KEYS: &[&str] = &["parado", "stopped"];
const CP_HEARTBEAT_LAG_KEYS: &[&str] = &["lastHbMs", "heartbeatLagMs", "hbLagMs"];
const CP_SESSION_KEYS: &[&str] = &["sesion", "session", "sessionId"];
const CP_DRIVER_KEYS: &[&str] = &["driver", "driverId"];
const CP_ENERGY_KEYS: &[&str] = &["kwh", "energyKwh"];
const CP_COST_KEYS: &[&str] = &["eur", "costEur"];
const CP_PRICE_KEYS: &[&str] = &["precio", "price", "priceEurPerKwh"];
const CP_TEMPERATURE_KEYS: &[&str] = &["tempC", "temperature", "temperatureC"];
const CP_WEATHER_ALERT_KEYS: &[&str] = &["weatherAlert", "alertaClima"];
const CP_WEATHER_TS_KEYS: &[&str] = &["weatherTs", "lastWeatherTs", "ts"];
const CP_REGISTERED_KEYS: &[&str] = &["registered", "registrado"];
const CP_TOKEN_KEYS: &[&str] = &["token"];

const DRIVER_ID_KEYS: &[&str] = &["id", "driver", "driverId"];
const DRIVER_VEHICLE_KEYS: &[&str] = &["vehicle", "matricula"];
const DRIVER_STATE_KEYS: &[&str] = &["status", "estado"];
const DRIVER_CP_KEYS: &[&str] = &["cp", "cpId", "assignedCp"];

const SESSION_ID_KEYS: &[&str] = &["session", "sesion", "id", "sessionId"];
const SESSION_CP_KEYS: &[&str] = &["cp", "cpId"];
const SESSION_DRIVER_KEYS: &[&str] = &["driver", "driverId"];
const SESSION_START_KEYS: &[&str] = &["startUTC", "startedAt", "start"];
const SESSION_ENERGY_KEYS: &[&str] = &["kwh", "energyKwh"];
const SESSION_COST_KEYS: &[&str] = &["eur", "costEur"];

const ALERT_TS_KEYS: &[&str] = &["ts", "timestamp"];
const ALERT_KIND_KEYS: &[&str] = &["type", "eventType"];
const ALERT_SOURCE_KEYS: &[&str] = &["src", "source"];
const ALERT_MESSAGE_KEYS: &[&str] = &["msg", "message", "detail"];

const AUDIT_TS_KEYS: &[&str] = &["ts", "timestamp"];
const AUDIT_IP_KEYS: &[&str] = &["sourceIp", "ip"];
const AUDIT_ACTION_KEYS: &[&str] = &["action", "event"];
const AUDIT_DETAILS_KEYS: &[&str] = &["details", "detail"];

const STATE_ALIASES: &[(&str, CpState)] = &[
    ("AVAILABLE", CpState::Available),
    ("ACTIVADO", CpState::Available),
    ("CHARGING", CpState::Charging),
    ("SUMINISTRANDO", CpState::Charging),
    ("STOPPED", CpState::Stopped),
    ("PARADO", CpState::Stopped),
    ("BROKEN", CpState::Broken),
    ("AVERIADO", CpState::Broken),
    ("DISCONNECTED", CpState::Disconnected),
    ("DESCONECTADO", CpState::Disconnected),
];

/// Normalizes every item of a section. Unidentifiable items are dropped and
/// reported individually; the rest of the batch is kept.
pub fn normalize_batch<T: Canonical>(items: &[Value]) -> Normalized<T> {
    let mut records = Vec::with_capacity(items.len());
    let mut malformed = Vec::new();

    for (index, item) in items.iter().enumerate() {
        match normalize_item::<T>(item) {
            Ok(record) => records.push(record),
            Err(error) => {
                tracing::warn!(
                    entity = %T::KIND,
                    index,
                    error = %error,
                    "dropping malformed upstream record"
                );
                malformed.push(MalformedRecord {
                    entity: T::KIND,
                    index,
                    reason: error.to_string(),
                });
            }
        }
    }

    Normalized { records, malformed }
}

pub fn normalize_item<T: Canonical>(item: &Value) -> Result<T, NormalizeError> {
    let object = item.as_object().ok_or(NormalizeError::NotAnObject)?;
    T::from_raw(object)
}

impl Canonical for ChargePoint {
    const KIND: EntityKind = EntityKind::ChargePoint;

    fn from_raw(object: &Map<String, Value>) -> Result<Self, NormalizeError> {
        let id = find_text(object, CP_ID_KEYS)
            .ok_or(NormalizeError::MissingIdentifier(CP_ID_KEYS))?;
        let weather_alert_explicit = find_bool(object, CP_WEATHER_ALERT_KEYS);

        Ok(Self {
            location: find_text(object, CP_LOCATION_KEYS).unwrap_or_else(|| id.clone()),
            state: find_text(object, CP_STATE_KEYS)
                .map(|raw| parse_state(&raw))
                .unwrap_or(CpState::Unknown),
            occupied: find_bool(object, CP_OCCUPIED_KEYS).unwrap_or(false),
            stopped: find_bool(object, CP_STOPPED_KEYS).unwrap_or(false),
            heartbeat_lag_ms: find_number(object, CP_HEARTBEAT_LAG_KEYS)
                .and_then(f64_to_non_negative_u64)
                .unwrap_or(0),
            session_id: find_text(object, CP_SESSION_KEYS),
            driver_id: find_text(object, CP_DRIVER_KEYS),
            energy_kwh: find_non_negative(object, CP_ENERGY_KEYS).unwrap_or(0.0),
            cost_eur: find_non_negative(object, CP_COST_KEYS).unwrap_or(0.0),
            price_eur_per_kwh: find_non_negative(object, CP_PRICE_KEYS).unwrap_or(0.0),
            temperature_c: find_number(object, CP_TEMPERATURE_KEYS),
            weather_alert: weather_alert_explicit.unwrap_or(false),
            weather_alert_explicit,
            weather_observed_at: find_timestamp(object, CP_WEATHER_TS_KEYS),
            registered: find_bool(object, CP_REGISTERED_KEYS),
            token: find_text(object, CP_TOKEN_KEYS),
            id,
        })
    }
}

impl Canonical for Driver {
    const KIND: EntityKind = EntityKind::Driver;

    fn from_raw(object: &Map<String, Value>) -> Result<Self, NormalizeError> {
        let id = find_text(object, DRIVER_ID_KEYS)
            .ok_or(NormalizeError::MissingIdentifier(DRIVER_ID_KEYS))?;

        Ok(Self {
            id,
            vehicle: find_text(object, DRIVER_VEHICLE_KEYS),
            state: find_text(object, DRIVER_STATE_KEYS),
            assigned_cp_id: find_text(object, DRIVER_CP_KEYS),
        })
    }
}

impl Canonical for Session {
    const KIND: EntityKind = EntityKind::Session;

    fn from_raw(object: &Map<String, Value>) -> Result<Self, NormalizeError> {
        let id = find_text(object, SESSION_ID_KEYS)
            .ok_or(NormalizeError::MissingIdentifier(SESSION_ID_KEYS))?;

        Ok(Self {
            id,
            cp_id: find_text(object, SESSION_CP_KEYS),
            driver_id: find_text(object, SESSION_DRIVER_KEYS),
            started_at_utc: find_timestamp(object, SESSION_START_KEYS),
            energy_kwh: find_non_negative(object, SESSION_ENERGY_KEYS).unwrap_or(0.0),
            cost_eur: find_non_negative(object, SESSION_COST_KEYS).unwrap_or(0.0),
        })
    }
}

impl Canonical for UpstreamAlert {
    const KIND: EntityKind = EntityKind::UpstreamAlert;

    fn from_raw(object: &Map<String, Value>) -> Result<Self, NormalizeError> {
        Ok(Self {
            timestamp: find_timestamp(object, ALERT_TS_KEYS),
            kind: find_text(object, ALERT_KIND_KEYS),
            source: find_text(object, ALERT_SOURCE_KEYS),
            message: find_text(object, ALERT_MESSAGE_KEYS),
        })
    }
}

impl Canonical for AuditEntry {
    const KIND: EntityKind = EntityKind::AuditEntry;

    fn from_raw(object: &Map<String, Value>) -> Result<Self, NormalizeError> {
        Ok(Self {
            timestamp: find_timestamp(object, AUDIT_TS_KEYS),
            source_ip: find_text(object, AUDIT_IP_KEYS),
            action: find_text(object, AUDIT_ACTION_KEYS),
            details: find_text(object, AUDIT_DETAILS_KEYS),
        })
    }
}

pub fn parse_state(raw: &str) -> CpState {
    let upper = raw.trim().to_uppercase();
    STATE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == upper)
        .map(|(_, state)| *state)
        .unwrap_or(CpState::Unknown)
}

fn find_text(object: &Map<String, Value>, aliases: &[&str]) -> Option<String> {
    find_value(object, aliases).and_then(|value| match value {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    })
}

fn find_number(object: &Map<String, Value>, aliases: &[&str]) -> Option<f64> {
    find_value(object, aliases).and_then(parse_f64)
}

fn find_non_negative(object: &Map<String, Value>, aliases: &[&str]) -> Option<f64> {
    find_number(object, aliases).filter(|value| *value >= 0.0)
}

fn find_bool(object: &Map<String, Value>, aliases: &[&str]) -> Option<bool> {
    find_value(object, aliases).and_then(|value| match value {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => number.as_f64().map(|value| value != 0.0),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

fn find_timestamp(object: &Map<String, Value>, aliases: &[&str]) -> Option<DateTime<Utc>> {
    find_value(object, aliases).and_then(|value| match value {
        Value::String(text) => DateTime::parse_from_rfc3339(text.trim())
            .map(|parsed| parsed.with_timezone(&Utc))
            .ok()
            .or_else(|| parse_f64(value).and_then(millis_to_datetime)),
        _ => parse_f64(value).and_then(millis_to_datetime),
    })
}

/// First present value in alias priority order. Null and blank strings count
/// as absent. Exact key matches win over case/punctuation-insensitive ones.
fn find_value<'a>(object: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    if let Some(value) = aliases
        .iter()
        .find_map(|alias| object.get(*alias).filter(|value| is_present(value)))
    {
        return Some(value);
    }

    aliases.iter().find_map(|alias| {
        let normalized_alias = normalize_key(alias);
        object.iter().find_map(|(key, value)| {
            if normalize_key(key) == normalized_alias && is_present(value) {
                Some(value)
            } else {
                None
            }
        })
    })
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(text) => !text.trim().is_empty(),
        _ => true,
    }
}

fn normalize_key(value: &str) -> String {
    value
        .chars()
        .filter(|char| char.is_ascii_alphanumeric())
        .flat_map(|char| char.to_lowercase())
        .collect()
}

fn parse_f64(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }?;

    number.is_finite().then_some(number)
}

/// Rounds up so a fractional lag just past a threshold still exceeds it.
fn f64_to_non_negative_u64(value: f64) -> Option<u64> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }

    Some(value.ceil() as u64)
}

fn millis_to_datetime(value: f64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(value as i64)
}
