#[tokio::main]
async fn main() {
    if let Err(e) = spot_cli::run().await {
        spot_cli::output::print_error(&e.to_string());
        std::process::exit(1);
    }
}
