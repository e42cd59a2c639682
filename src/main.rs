fn main() {
    if let Err(err) = inventory_import::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
