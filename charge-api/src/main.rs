fn main() {
    if let Err(err) = ev_charge_portal::app::run() {
        eprintln!("api startup failed: {err}");
        std::process::exit(1);
    }
}
