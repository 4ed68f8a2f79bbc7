use std::sync::{
    Arc, Mutex, MutexGuard, RwLock,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::adapters::central_http::{CentralClient, CentralTransport, FetchError, Fetched, Section};
use crate::app::snapshot::{FleetSnapshot, SectionDiagnostic, SnapshotSink};
use crate::domain::derive::{derive_views, resolve_weather_flags};
use crate::domain::models::{AuditEntry, ChargePoint, Driver, Session, UpstreamAlert};
use crate::domain::normalize::{Canonical, MalformedRecord, Normalized, normalize_batch};

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CycleError {
    #[error("no central base URL configured")]
    NoBaseUrlConfigured,
}

/// Operator-set central base URL, shared between the scheduler and the view.
#[derive(Debug, Clone, Default)]
pub struct CentralUrl {
    inner: Arc<RwLock<Option<String>>>,
}

impl CentralUrl {
    pub fn new(initial: Option<&str>) -> Self {
        let url = Self::default();
        url.set(initial);
        url
    }

    pub fn get(&self) -> Option<String> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Trims whitespace and trailing slashes; blank input clears the URL.
    pub fn set(&self, url: Option<&str>) -> Option<String> {
        let normalized = url
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty());

        match self.inner.write() {
            Ok(mut guard) => *guard = normalized.clone(),
            Err(poisoned) => *poisoned.into_inner() = normalized.clone(),
        }

        normalized
    }
}

/// One fetch → normalize → derive → publish pass over the central API.
pub struct RefreshEngine<T, S, C> {
    client: CentralClient<T>,
    central_url: CentralUrl,
    sink: S,
    clock: C,
}

impl<T, S, C> RefreshEngine<T, S, C>
where
    T: CentralTransport,
    S: SnapshotSink,
    C: Clock,
{
    pub fn new(client: CentralClient<T>, central_url: CentralUrl, sink: S, clock: C) -> Self {
        Self {
            client,
            central_url,
            sink,
            clock,
        }
    }

    pub async fn run_cycle(&self) -> Result<Arc<FleetSnapshot>, CycleError> {
        let cycle_at = self.clock.now();

        let Some(base_url) = self.central_url.get() else {
            self.sink
                .publish(Arc::new(FleetSnapshot::awaiting_configuration(cycle_at)));
            return Err(CycleError::NoBaseUrlConfigured);
        };

        let (cps, sessions, drivers, upstream_alerts, audit) = tokio::join!(
            self.load::<ChargePoint>(&base_url, Section::ChargePoints),
            self.load::<Session>(&base_url, Section::Sessions),
            self.load::<Driver>(&base_url, Section::Drivers),
            self.load::<UpstreamAlert>(&base_url, Section::Alerts),
            self.load::<AuditEntry>(&base_url, Section::Audit),
        );

        let mut builder = SnapshotBuilder::default();
        let charge_points =
            resolve_weather_flags(builder.absorb(Section::ChargePoints, cps).unwrap_or_default());
        let sessions = builder.absorb(Section::Sessions, sessions).unwrap_or_default();
        let drivers = builder.absorb(Section::Drivers, drivers).unwrap_or_default();
        let upstream_alerts = builder
            .absorb(Section::Alerts, upstream_alerts)
            .unwrap_or_default();
        let audit = builder.absorb(Section::Audit, audit);

        let views = derive_views(&charge_points, cycle_at);

        let snapshot = Arc::new(FleetSnapshot {
            cycle_at: Some(cycle_at),
            charge_points,
            drivers,
            sessions,
            alerts: views.alerts,
            upstream_alerts,
            audit,
            weather: views.weather,
            weather_status: views.weather_status,
            failed_sections: builder.failed_sections,
            unavailable_sections: builder.unavailable_sections,
            dropped_records: builder.dropped_records,
            config_prompt: None,
        });

        tracing::info!(
            cps = snapshot.charge_points.len(),
            drivers = snapshot.drivers.len(),
            sessions = snapshot.sessions.len(),
            alerts = snapshot.alerts.len(),
            failed_sections = snapshot.failed_sections.len(),
            dropped_records = snapshot.dropped_records.len(),
            "refresh cycle completed"
        );

        self.sink.publish(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    async fn load<R>(&self, base_url: &str, section: Section) -> Result<Normalized<R>, FetchError>
    where
        R: Canonical,
    {
        match self.client.fetch_section(base_url, section).await {
            Fetched::Items(items) => Ok(normalize_batch::<R>(&items)),
            Fetched::Absent(error) => Err(error),
        }
    }
}

#[derive(Default)]
struct SnapshotBuilder {
    failed_sections: Vec<SectionDiagnostic>,
    unavailable_sections: Vec<Section>,
    dropped_records: Vec<MalformedRecord>,
}

impl SnapshotBuilder {
    /// `None` when the section could not be fetched; the failure is recorded
    /// and the caller substitutes an empty collection.
    fn absorb<R>(
        &mut self,
        section: Section,
        loaded: Result<Normalized<R>, FetchError>,
    ) -> Option<Vec<R>> {
        match loaded {
            Ok(normalized) => {
                self.dropped_records.extend(normalized.malformed);
                Some(normalized.records)
            }
            Err(error) if section.is_optional() => {
                tracing::debug!(section = ?section, error = %error, "optional section unavailable");
                self.unavailable_sections.push(section);
                None
            }
            Err(error) => {
                tracing::warn!(section = ?section, error = %error, "section fetch failed");
                self.failed_sections.push(SectionDiagnostic {
                    section,
                    message: error.to_string(),
                });
                None
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
struct CycleGate {
    running: Arc<AtomicBool>,
}

/// Holds the gate in RUNNING; dropping it (also on panic) returns to IDLE.
struct RunningGuard {
    running: Arc<AtomicBool>,
}

impl CycleGate {
    fn try_begin(&self) -> Option<RunningGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunningGuard {
                running: Arc::clone(&self.running),
            })
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

pub enum TickOutcome {
    Started(JoinHandle<Result<Arc<FleetSnapshot>, CycleError>>),
    Skipped,
}

/// Drives the engine on a fixed cadence with at most one cycle in flight.
pub struct Scheduler<T, S, C> {
    engine: Arc<RefreshEngine<T, S, C>>,
    gate: CycleGate,
    requested: Arc<Mutex<Option<RunningGuard>>>,
    refresh_requested: Arc<Notify>,
}

impl<T, S, C> Clone for Scheduler<T, S, C> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            gate: self.gate.clone(),
            requested: Arc::clone(&self.requested),
            refresh_requested: Arc::clone(&self.refresh_requested),
        }
    }
}

impl<T, S, C> Scheduler<T, S, C>
where
    T: CentralTransport,
    S: SnapshotSink,
    C: Clock,
{
    pub fn new(engine: RefreshEngine<T, S, C>) -> Self {
        Self {
            engine: Arc::new(engine),
            gate: CycleGate::default(),
            requested: Arc::new(Mutex::new(None)),
            refresh_requested: Arc::new(Notify::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.gate.is_running()
    }

    /// Starts a cycle when IDLE; a tick arriving while RUNNING is dropped.
    pub fn tick(&self) -> TickOutcome {
        let Some(guard) = self.gate.try_begin() else {
            tracing::debug!("previous refresh cycle still running, tick dropped");
            return TickOutcome::Skipped;
        };

        TickOutcome::Started(self.start(guard))
    }

    fn start(&self, guard: RunningGuard) -> JoinHandle<Result<Arc<FleetSnapshot>, CycleError>> {
        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move {
            let _guard = guard;
            let result = engine.run_cycle().await;
            if let Err(error) = &result {
                tracing::warn!(error = %error, "refresh cycle aborted");
            }
            result
        })
    }

    /// Slot for a gate claimed by `request_refresh`, waiting for the run loop.
    fn requested_slot(&self) -> MutexGuard<'_, Option<RunningGuard>> {
        match self.requested.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Ticks immediately, then every `period` until `shutdown` is notified.
    /// Manual refresh requests arrive with the gate already claimed, so a
    /// timer tick racing them is dropped like any other overlapping tick.
    pub async fn run(self, period: Duration, shutdown: Arc<Notify>) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let _ = self.tick();
                }
                _ = self.refresh_requested.notified() => {
                    let claimed = self.requested_slot().take();
                    if let Some(guard) = claimed {
                        let _ = self.start(guard);
                    }
                }
                _ = shutdown.notified() => {
                    tracing::info!("refresh scheduler stopping");
                    break;
                }
            }
        }
    }
}

/// Lets the HTTP view request an out-of-band refresh without knowing the
/// transport type. The request is served by the `run` loop.
pub trait RefreshTrigger: Send + Sync {
    /// `true` when this request claimed the gate and exactly one cycle will
    /// follow; `false` when a cycle is already in flight.
    fn request_refresh(&self) -> bool;

    fn is_refreshing(&self) -> bool;
}

impl<T, S, C> RefreshTrigger for Scheduler<T, S, C>
where
    T: CentralTransport,
    S: SnapshotSink,
    C: Clock,
{
    fn request_refresh(&self) -> bool {
        let Some(guard) = self.gate.try_begin() else {
            return false;
        };
        *self.requested_slot() = Some(guard);
        self.refresh_requested.notify_one();
        true
    }

    fn is_refreshing(&self) -> bool {
        self.is_running()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use tokio::sync::Notify;

    use super::{CentralUrl, CycleError, RefreshEngine, RefreshTrigger, Scheduler, TickOutcome};
    use crate::adapters::central_http::{CentralClient, Section};
    use crate::app::snapshot::{SnapshotReader, SnapshotStore};
    use crate::domain::models::{AlertKind, CpState, WeatherStatus};
    use crate::test_support::{FixedClock, ScriptedTransport};

    const BASE_URL: &str = "http://central:8080";

    fn healthy_central() -> ScriptedTransport {
        ScriptedTransport::new()
            .respond(
                "/api/cps",
                json!({"items": [
                    {"cp": "CP-1", "estado": "SUMINISTRANDO", "tempC": 18.5},
                    {"cp": "CP-2", "estado": "AVERIADO", "lastHbMs": 7000},
                    {"loc": "nowhere"}
                ]}),
            )
            .respond("/api/sessions", json!({"items": [{"session": "S-1", "cp": "CP-1"}]}))
            .respond("/api/drivers", json!([{"driver": "DRV-1"}, {"driver": "DRV-2"}]))
            .respond("/api/alerts", json!({"items": [{"type": "AUTH", "msg": "token rejected"}]}))
            .respond("/api/audit", json!({"items": []}))
    }

    fn scheduler_with(
        transport: ScriptedTransport,
        url: Option<&str>,
    ) -> (
        Scheduler<ScriptedTransport, SnapshotStore, FixedClock>,
        SnapshotReader,
    ) {
        let (store, reader) = SnapshotStore::channel();
        let engine = RefreshEngine::new(
            CentralClient::new(transport),
            CentralUrl::new(url),
            store,
            FixedClock::at_ymd_hms(2026, 1, 10, 9, 0, 0),
        );
        (Scheduler::new(engine), reader)
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        while !condition() {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn central_url_is_normalized() {
        let url = CentralUrl::new(Some("  http://central:8080//  "));
        assert_eq!(url.get().as_deref(), Some("http://central:8080"));

        assert_eq!(url.set(Some("   ")), None);
        assert_eq!(url.get(), None);
    }

    #[tokio::test]
    async fn cycle_publishes_normalized_and_derived_snapshot() {
        let (scheduler, reader) = scheduler_with(healthy_central(), Some(BASE_URL));

        let snapshot = scheduler
            .engine
            .run_cycle()
            .await
            .expect("cycle should complete");

        assert_eq!(reader.latest(), snapshot);
        assert_eq!(snapshot.charge_points.len(), 2);
        assert_eq!(snapshot.charge_points[1].state, CpState::Broken);
        assert_eq!(snapshot.dropped_records.len(), 1);
        assert_eq!(snapshot.drivers.len(), 2);
        assert_eq!(snapshot.sessions.len(), 1);
        assert_eq!(snapshot.upstream_alerts.len(), 1);
        assert_eq!(snapshot.audit.as_ref().map(Vec::len), Some(0));
        assert_eq!(snapshot.weather_status, WeatherStatus::Ok);
        assert_eq!(snapshot.weather.len(), 1);
        let kinds: Vec<AlertKind> = snapshot.alerts.iter().map(|alert| alert.kind).collect();
        assert_eq!(kinds, vec![AlertKind::CpState, AlertKind::Heartbeat]);
        assert!(snapshot.failed_sections.is_empty());
        assert!(snapshot.unavailable_sections.is_empty());
    }

    #[tokio::test]
    async fn published_cps_carry_inferred_weather_flag() {
        let transport = ScriptedTransport::new()
            .respond("/api/cps", json!([{"cp": "A", "tempC": -3}]))
            .respond("/api/drivers", json!([]))
            .respond("/api/sessions", json!([]));
        let (scheduler, reader) = scheduler_with(transport, Some(BASE_URL));

        scheduler
            .engine
            .run_cycle()
            .await
            .expect("cycle should complete");

        let snapshot = reader.latest();
        let published = serde_json::to_value(&snapshot.charge_points[0])
            .expect("charge point should serialize");
        assert_eq!(published["weatherAlert"], true);
        assert_eq!(snapshot.weather_status, WeatherStatus::Alert);
    }

    #[tokio::test]
    async fn failing_cp_section_does_not_block_drivers() {
        let transport = ScriptedTransport::new()
            .fail_status("/api/cps", 502)
            .fail_transport("/api/status")
            .respond("/api/drivers", json!({"items": [{"id": "DRV-1"}]}))
            .respond("/api/sessions", json!({"items": []}));
        let (scheduler, reader) = scheduler_with(transport, Some(BASE_URL));

        scheduler
            .engine
            .run_cycle()
            .await
            .expect("cycle should complete");

        let snapshot = reader.latest();
        assert!(snapshot.charge_points.is_empty());
        assert!(snapshot.section_failed(Section::ChargePoints));
        assert!(!snapshot.section_failed(Section::Drivers));
        assert_eq!(snapshot.drivers.len(), 1);
        assert_eq!(snapshot.weather_status, WeatherStatus::NoCps);
        assert_eq!(
            snapshot.unavailable_sections,
            vec![Section::Alerts, Section::Audit]
        );
        assert_eq!(snapshot.audit, None);
    }

    #[tokio::test]
    async fn missing_base_url_aborts_before_any_request() {
        let transport = healthy_central();
        let (scheduler, reader) = scheduler_with(transport.clone(), None);

        let result = scheduler.engine.run_cycle().await;

        assert_eq!(result, Err(CycleError::NoBaseUrlConfigured));
        assert!(transport.calls().is_empty());
        assert!(reader.latest().config_prompt.is_some());
    }

    #[tokio::test]
    async fn tick_while_running_is_dropped() {
        let transport = healthy_central();
        transport.hold();
        let (scheduler, reader) = scheduler_with(transport.clone(), Some(BASE_URL));

        let TickOutcome::Started(first) = scheduler.tick() else {
            panic!("first tick must start a cycle");
        };
        wait_until(|| transport.calls_to("/api/cps") == 1).await;

        assert!(scheduler.is_running());
        assert!(matches!(scheduler.tick(), TickOutcome::Skipped));
        assert_eq!(transport.calls_to("/api/cps"), 1);
        assert_eq!(reader.latest().cycle_at, None);

        transport.release();
        first
            .await
            .expect("cycle task should not panic")
            .expect("cycle should complete");

        assert!(!scheduler.is_running());
        assert!(reader.latest().cycle_at.is_some());

        let TickOutcome::Started(second) = scheduler.tick() else {
            panic!("tick after completion must start a cycle");
        };
        second
            .await
            .expect("cycle task should not panic")
            .expect("cycle should complete");
        assert_eq!(transport.calls_to("/api/cps"), 2);
    }

    #[tokio::test]
    async fn run_starts_first_cycle_immediately() {
        let transport = healthy_central();
        let (scheduler, reader) = scheduler_with(transport.clone(), Some(BASE_URL));
        let shutdown = Arc::new(Notify::new());

        let handle = tokio::spawn(
            scheduler
                .clone()
                .run(Duration::from_secs(3600), Arc::clone(&shutdown)),
        );
        wait_until(|| reader.latest().cycle_at.is_some()).await;

        assert_eq!(transport.calls_to("/api/cps"), 1);

        shutdown.notify_one();
        handle.await.expect("scheduler task should stop cleanly");
    }

    #[tokio::test]
    async fn refresh_request_runs_an_extra_cycle() {
        let transport = healthy_central();
        let (scheduler, reader) = scheduler_with(transport.clone(), Some(BASE_URL));
        let shutdown = Arc::new(Notify::new());

        let handle = tokio::spawn(
            scheduler
                .clone()
                .run(Duration::from_secs(3600), Arc::clone(&shutdown)),
        );
        wait_until(|| reader.latest().cycle_at.is_some() && !scheduler.is_running()).await;

        assert!(scheduler.request_refresh());
        wait_until(|| transport.calls_to("/api/cps") == 2).await;

        transport.hold();
        wait_until(|| !scheduler.is_running()).await;
        assert!(scheduler.request_refresh());
        wait_until(|| scheduler.is_refreshing()).await;
        assert!(!scheduler.request_refresh());
        transport.release();

        shutdown.notify_one();
        handle.await.expect("scheduler task should stop cleanly");
    }

    #[tokio::test]
    async fn refresh_racing_a_timer_tick_runs_one_cycle() {
        let transport = healthy_central();
        let (scheduler, reader) = scheduler_with(transport.clone(), Some(BASE_URL));
        let shutdown = Arc::new(Notify::new());

        assert!(scheduler.request_refresh());
        assert!(scheduler.is_refreshing());
        assert!(matches!(scheduler.tick(), TickOutcome::Skipped));

        let handle = tokio::spawn(
            scheduler
                .clone()
                .run(Duration::from_secs(3600), Arc::clone(&shutdown)),
        );
        wait_until(|| reader.latest().cycle_at.is_some() && !scheduler.is_running()).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(transport.calls_to("/api/cps"), 1);
        assert!(!scheduler.is_running());

        shutdown.notify_one();
        handle.await.expect("scheduler task should stop cleanly");
    }
}
