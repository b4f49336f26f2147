use assetflow_api::setup;
use assetflow_core::Config;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;

    let (state, router) = setup::initialize_app(config.clone()).await?;
    let background = setup::start_background_tasks(&state);

    setup::server::start_server(&config, router).await?;

    background.shutdown().await;
    tracing::info!("Shutdown complete");

    Ok(())
}
