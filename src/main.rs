use anyhow::{Context, Result};
use dotenv::dotenv;

use vulnquiz::{config::ServerConfig, quizweb};

#[actix_web::main]
async fn main() -> Result<()> {
    // .env first so it can set RUST_LOG
    dotenv().ok();
    env_logger::init();

    let config = ServerConfig::from_env().context("Invalid server configuration")?;
    log::info!("Serving challenges from {}", config.database.display());

    quizweb::run(config).await
}
