fn main() {
    if let Err(err) = csv_recipe::run() {
        eprintln!("error: {err}");
        std::process::exit(err.code);
    }
}
