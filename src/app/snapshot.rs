use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::adapters::central_http::Section;
use crate::domain::models::{
    Alert, AuditEntry, ChargePoint, Driver, Session, UpstreamAlert, WeatherObservation,
    WeatherStatus,
};
use crate::domain::normalize::MalformedRecord;

pub const CONFIGURE_CENTRAL_PROMPT: &str =
    "configure the central URL (CENTRAL_URL or PUT /config/central-url)";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionDiagnostic {
    pub section: Section,
    pub message: String,
}

/// Read-only result of one refresh cycle. Replaced as a whole, never edited.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetSnapshot {
    pub cycle_at: Option<DateTime<Utc>>,
    pub charge_points: Vec<ChargePoint>,
    pub drivers: Vec<Driver>,
    pub sessions: Vec<Session>,
    pub alerts: Vec<Alert>,
    pub upstream_alerts: Vec<UpstreamAlert>,
    pub audit: Option<Vec<AuditEntry>>,
    pub weather: Vec<WeatherObservation>,
    pub weather_status: WeatherStatus,
    pub failed_sections: Vec<SectionDiagnostic>,
    pub unavailable_sections: Vec<Section>,
    pub dropped_records: Vec<MalformedRecord>,
    pub config_prompt: Option<String>,
}

impl FleetSnapshot {
    /// Placeholder published before the first cycle completes.
    pub fn empty() -> Self {
        Self {
            cycle_at: None,
            charge_points: Vec::new(),
            drivers: Vec::new(),
            sessions: Vec::new(),
            alerts: Vec::new(),
            upstream_alerts: Vec::new(),
            audit: None,
            weather: Vec::new(),
            weather_status: WeatherStatus::NoCps,
            failed_sections: Vec::new(),
            unavailable_sections: Vec::new(),
            dropped_records: Vec::new(),
            config_prompt: None,
        }
    }

    pub fn awaiting_configuration(cycle_at: DateTime<Utc>) -> Self {
        Self {
            cycle_at: Some(cycle_at),
            config_prompt: Some(CONFIGURE_CENTRAL_PROMPT.to_string()),
            ..Self::empty()
        }
    }

    pub fn section_failed(&self, section: Section) -> bool {
        self.failed_sections
            .iter()
            .any(|diagnostic| diagnostic.section == section)
    }
}

/// Receives every completed snapshot. Implementations only render or store it.
pub trait SnapshotSink: Send + Sync + 'static {
    fn publish(&self, snapshot: Arc<FleetSnapshot>);
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    sender: Arc<watch::Sender<Arc<FleetSnapshot>>>,
}

#[derive(Debug, Clone)]
pub struct SnapshotReader {
    receiver: watch::Receiver<Arc<FleetSnapshot>>,
}

impl SnapshotStore {
    pub fn channel() -> (Self, SnapshotReader) {
        let (sender, receiver) = watch::channel(Arc::new(FleetSnapshot::empty()));
        (
            Self {
                sender: Arc::new(sender),
            },
            SnapshotReader { receiver },
        )
    }
}

impl SnapshotSink for SnapshotStore {
    fn publish(&self, snapshot: Arc<FleetSnapshot>) {
        self.sender.send_replace(snapshot);
    }
}

impl SnapshotReader {
    pub fn latest(&self) -> Arc<FleetSnapshot> {
        self.receiver.borrow().clone()
    }
}

/// Headless view: writes each snapshot's alerts and diagnostics to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl SnapshotSink for LogSink {
    fn publish(&self, snapshot: Arc<FleetSnapshot>) {
        if let Some(prompt) = &snapshot.config_prompt {
            tracing::warn!(prompt = %prompt, "monitor is not configured");
            return;
        }

        for diagnostic in &snapshot.failed_sections {
            tracing::warn!(section = ?diagnostic.section, error = %diagnostic.message, "section unavailable");
        }

        for alert in snapshot.alerts.iter() {
            tracing::warn!(
                kind = ?alert.kind,
                source = %alert.source,
                message = %alert.message,
                "fleet alert"
            );
        }

        tracing::info!(
            cps = snapshot.charge_points.len(),
            drivers = snapshot.drivers.len(),
            sessions = snapshot.sessions.len(),
            alerts = snapshot.alerts.len(),
            upstream_alerts = snapshot.upstream_alerts.len(),
            weather_status = ?snapshot.weather_status,
            "fleet snapshot"
        );
    }
}
