fn main() {
    if let Err(err) = tablescope::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
