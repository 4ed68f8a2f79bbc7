fn main() {
    if let Err(err) = ev_fleet_monitor::app::run() {
        eprintln!("application startup failed: {err}");
        std::process::exit(1);
    }
}
