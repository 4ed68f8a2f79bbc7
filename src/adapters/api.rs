use std::sync::Arc;

use actix_web::{HttpResponse, Responder, get, post, put, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::adapters::central_http::Section;
use crate::app::scheduler::{CentralUrl, RefreshTrigger};
use crate::app::snapshot::{SectionDiagnostic, SnapshotReader};
use crate::domain::models::{Alert, UpstreamAlert, WeatherObservation, WeatherStatus};
use crate::domain::normalize::MalformedRecord;

#[derive(Clone)]
pub struct ApiState {
    pub snapshots: SnapshotReader,
    pub central_url: CentralUrl,
    pub refresher: Arc<dyn RefreshTrigger>,
}

#[derive(Debug, Serialize)]
pub struct AlertsResponse<'a> {
    pub derived: &'a [Alert],
    pub upstream: &'a [UpstreamAlert],
}

#[derive(Debug, Serialize)]
pub struct WeatherResponse<'a> {
    pub status: WeatherStatus,
    pub observations: &'a [WeatherObservation],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsResponse<'a> {
    pub cycle_at: Option<DateTime<Utc>>,
    pub central_url: Option<String>,
    pub refreshing: bool,
    pub failed_sections: &'a [SectionDiagnostic],
    pub unavailable_sections: &'a [Section],
    pub dropped_records: &'a [MalformedRecord],
    pub config_prompt: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
pub struct CentralUrlRequest {
    pub url: Option<String>,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(snapshot_endpoint)
        .service(list_cps_endpoint)
        .service(list_drivers_endpoint)
        .service(list_sessions_endpoint)
        .service(list_alerts_endpoint)
        .service(weather_endpoint)
        .service(audit_endpoint)
        .service(diagnostics_endpoint)
        .service(set_central_url_endpoint)
        .service(refresh_endpoint);
}

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

#[get("/snapshot")]
async fn snapshot_endpoint(state: web::Data<ApiState>) -> impl Responder {
    HttpResponse::Ok().json(state.snapshots.latest().as_ref())
}

#[get("/cps")]
async fn list_cps_endpoint(state: web::Data<ApiState>) -> impl Responder {
    HttpResponse::Ok().json(&state.snapshots.latest().charge_points)
}

#[get("/drivers")]
async fn list_drivers_endpoint(state: web::Data<ApiState>) -> impl Responder {
    HttpResponse::Ok().json(&state.snapshots.latest().drivers)
}

#[get("/sessions")]
async fn list_sessions_endpoint(state: web::Data<ApiState>) -> impl Responder {
    HttpResponse::Ok().json(&state.snapshots.latest().sessions)
}

#[get("/alerts")]
async fn list_alerts_endpoint(state: web::Data<ApiState>) -> impl Responder {
    let snapshot = state.snapshots.latest();
    HttpResponse::Ok().json(AlertsResponse {
        derived: &snapshot.alerts,
        upstream: &snapshot.upstream_alerts,
    })
}

#[get("/weather")]
async fn weather_endpoint(state: web::Data<ApiState>) -> impl Responder {
    let snapshot = state.snapshots.latest();
    HttpResponse::Ok().json(WeatherResponse {
        status: snapshot.weather_status,
        observations: &snapshot.weather,
    })
}

#[get("/audit")]
async fn audit_endpoint(state: web::Data<ApiState>) -> impl Responder {
    match &state.snapshots.latest().audit {
        Some(entries) => HttpResponse::Ok().json(entries),
        None => HttpResponse::NotFound().json(serde_json::json!({
            "error": "audit log not available from central"
        })),
    }
}

#[get("/diagnostics")]
async fn diagnostics_endpoint(state: web::Data<ApiState>) -> impl Responder {
    let snapshot = state.snapshots.latest();
    HttpResponse::Ok().json(DiagnosticsResponse {
        cycle_at: snapshot.cycle_at,
        central_url: state.central_url.get(),
        refreshing: state.refresher.is_refreshing(),
        failed_sections: &snapshot.failed_sections,
        unavailable_sections: &snapshot.unavailable_sections,
        dropped_records: &snapshot.dropped_records,
        config_prompt: snapshot.config_prompt.as_deref(),
    })
}

#[put("/config/central-url")]
async fn set_central_url_endpoint(
    state: web::Data<ApiState>,
    body: web::Json<CentralUrlRequest>,
) -> impl Responder {
    let central_url = state.central_url.set(body.url.as_deref());
    tracing::info!(
        central_url = central_url.as_deref().unwrap_or("<unset>"),
        "central URL updated"
    );

    let refresh_requested = state.refresher.request_refresh();

    HttpResponse::Ok().json(serde_json::json!({
        "centralUrl": central_url,
        "refreshRequested": refresh_requested,
    }))
}

#[post("/refresh")]
async fn refresh_endpoint(state: web::Data<ApiState>) -> impl Responder {
    if state.refresher.request_refresh() {
        HttpResponse::Accepted().json(serde_json::json!({ "status": "refresh requested" }))
    } else {
        HttpResponse::Conflict().json(serde_json::json!({
            "error": "a refresh cycle is already running"
        }))
    }
}
