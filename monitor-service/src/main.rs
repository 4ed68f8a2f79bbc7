fn main() {
    if let Err(err) = ev_fleet_monitor::app::run_service() {
        eprintln!("service startup failed: {err}");
        std::process::exit(1);
    }
}
