#![cfg(not(tarpaulin_include))]

use heatmap::app;
use heatmap::config::ServerConfig;
use std::env;

/// Main entry point for the location heatmap server
///
/// Reads the configuration from the environment (and `.env`), then starts the
/// HTTP server together with the hourly upload sweep.
///
/// # Arguments
/// * Optional first argument: port to listen on, overriding `PORT`
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error object
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut config = ServerConfig::from_env()?;

    let args: Vec<String> = env::args().collect();
    if args.len() >= 2 {
        config.port = args[1].parse().unwrap_or(config.port);
    }

    log::info!(
        "Starting server: uploads in {}, point budget {}",
        config.upload_dir.display(),
        config.max_points
    );
    app::run(config).await
}
