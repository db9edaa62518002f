#![cfg(not(tarpaulin_include))]

use bigpicture::app;
use bigpicture::config::Config;

/// Main entry point for the website
///
/// Loads `.env`, sets up logging (`RUST_LOG`, `info` by default) and serves
/// the site on `HOST:PORT`.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load()?;
    log::info!(
        "Starting Big Picture Ideas with content from {}",
        config.data_dir.display()
    );

    app::run(config).await?;
    Ok(())
}
