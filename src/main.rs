use fabric_trace::{cli, config::EngineConfig, logging::init_logging};

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("[WARN] Failed to read .env: {}", e);
        }
    }
    init_logging();

    let config = EngineConfig::load();
    tracing::debug!("Configuration: {:?}", config);

    if let Err(e) = cli::run(std::env::args(), config).await {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}
