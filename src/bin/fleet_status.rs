use std::time::Duration;

use ev_fleet_monitor::adapters::central_http::{CentralClient, ReqwestTransport};
use ev_fleet_monitor::app::AppConfig;
use ev_fleet_monitor::app::scheduler::{CentralUrl, RefreshEngine, SystemClock};
use ev_fleet_monitor::app::snapshot::{FleetSnapshot, SnapshotStore};
use ev_fleet_monitor::domain::models::{CpState, WeatherStatus};

fn main() {
    let _ = dotenvy::dotenv();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            println!("ERROR: {err}");
            std::process::exit(2);
        }
    };
    let central_url = std::env::args().nth(1).or(config.central_url);

    let transport = match ReqwestTransport::new(Duration::from_millis(config.http_timeout_ms)) {
        Ok(transport) => transport,
        Err(err) => {
            println!("ERROR: could not build HTTP client: {err}");
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            println!("ERROR: could not start runtime: {err}");
            std::process::exit(1);
        }
    };

    let (store, _reader) = SnapshotStore::channel();
    let engine = RefreshEngine::new(
        CentralClient::new(transport),
        CentralUrl::new(central_url.as_deref()),
        store,
        SystemClock,
    );

    match runtime.block_on(engine.run_cycle()) {
        Ok(snapshot) => print!("{}", render_report(&snapshot)),
        Err(err) => {
            println!("ERROR: {err}; pass the central URL as first argument or set CENTRAL_URL");
            std::process::exit(2);
        }
    }
}

fn render_report(snapshot: &FleetSnapshot) -> String {
    let mut out = String::new();

    if let Some(cycle_at) = snapshot.cycle_at {
        out.push_str(&format!("[{}] fleet status\n", cycle_at.to_rfc3339()));
    }

    for diagnostic in &snapshot.failed_sections {
        out.push_str(&format!(
            "  ! {:?} unavailable: {}\n",
            diagnostic.section, diagnostic.message
        ));
    }

    if snapshot.charge_points.is_empty() {
        out.push_str("  no CPs\n");
    }

    for cp in &snapshot.charge_points {
        out.push_str(&format!(
            "  {} ({}) | {} | occupied: {} | stopped: {} | hb lag: {} ms\n",
            cp.id,
            cp.location,
            cp.state.as_str(),
            yes_no(cp.occupied),
            yes_no(cp.stopped),
            cp.heartbeat_lag_ms
        ));

        if cp.state == CpState::Charging || cp.session_id.is_some() {
            out.push_str(&format!(
                "    session: {} | driver: {} | {:.4} kWh | {:.4} EUR @ {:.4} EUR/kWh\n",
                cp.session_id.as_deref().unwrap_or("n/a"),
                cp.driver_id.as_deref().unwrap_or("n/a"),
                cp.energy_kwh,
                cp.cost_eur,
                cp.price_eur_per_kwh
            ));
        }

        let weather_flag = if cp.weather_alert { " | WEATHER ALERT" } else { "" };
        match cp.temperature_c {
            Some(temp) => out.push_str(&format!("    temp: {temp:.2} C{weather_flag}\n")),
            None => out.push_str(&format!("    temp: n/a{weather_flag}\n")),
        }
    }

    out.push_str(&format!(
        "  weather: {}\n",
        match snapshot.weather_status {
            WeatherStatus::NoCps => "no CPs",
            WeatherStatus::NoData => "no data (weather service offline?)",
            WeatherStatus::Alert => "ALERT at some location",
            WeatherStatus::Ok => "OK",
        }
    ));

    if snapshot.alerts.is_empty() && snapshot.upstream_alerts.is_empty() {
        out.push_str("  no alerts\n");
    }

    for alert in &snapshot.alerts {
        out.push_str(&format!("  * CP {}: {}\n", alert.source, alert.message));
    }

    for alert in &snapshot.upstream_alerts {
        out.push_str(&format!(
            "  * [central] {}: {}\n",
            alert.source.as_deref().unwrap_or("?"),
            alert.message.as_deref().unwrap_or("")
        ));
    }

    out
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
