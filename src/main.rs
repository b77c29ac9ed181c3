use clap::Parser;
use servo_motion_runtime::config::{Cli, log_filter};

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .init();

    let cli = Cli::parse();

    if let Err(e) = servo_motion_runtime::runtime::run(cli).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
