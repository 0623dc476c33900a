use anyhow::Result;
use fieldgate::config::AppConfig;
use fieldgate::server::ServerBuilder;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("fieldgate=info,tower_http=info")),
        )
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        bind = %config.server.bind,
        entities = config.entities.len(),
        "starting fieldgate"
    );

    let bind = config.server.bind.clone();
    ServerBuilder::from_config(&config)
        .await?
        .serve(&bind)
        .await
}
