fn main() {
    if let Err(error) = funding_desk_lib::run() {
        eprintln!("funding-desk: {error}");
        std::process::exit(1);
    }
}
