use anyhow::Context;

use restohub_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    restohub_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let app = restohub_api::app::build_app(&config)
        .await
        .context("failed to wire services")?;

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
