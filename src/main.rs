fn main() {
    if let Err(e) = sales_advisor_lib::run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
