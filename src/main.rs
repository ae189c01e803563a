//! Serves the querybox JSON surface over the configured data sources.
//!
//! Usage: `querybox [settings-path]`. The path names a settings file without
//! extension (default `querybox`); `QUERYBOX_*` environment variables override it.

use std::error::Error;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use querybox::server::router;
use querybox::settings::Settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,querybox=debug".into()),
        )
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "querybox".to_owned());
    let settings = Settings::load(&path)?;
    let listen = settings.listen.clone();
    let config = settings.into_config()?;
    info!(sources = config.data_sources().len(), operators = ?config.operators(), "configuration loaded");

    let listener = TcpListener::bind(&listen).await?;
    info!("querybox listening on {listen}");
    axum::serve(listener, router(Arc::new(config))).await?;
    Ok(())
}
