mod handlers;
mod models;
mod routes;
mod services;
mod utils;

use std::error::Error;

use axum::serve;
use tokio::net::TcpListener;
use tracing::info;

use crate::{
    routes::{init_tracing, make_app},
    utils::config::{Config, SERVICE_NAME, SERVICE_VERSION},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();
    let config = Config::init()?;
    init_tracing(&config.log_level);
    info!("Starting {} v{}", SERVICE_NAME, SERVICE_VERSION);

    let app = make_app(&config).await?;

    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!("Listening on http://0.0.0.0:{}", config.port);

    serve(listener, app).await?;
    Ok(())
}
