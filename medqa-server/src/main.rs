use std::sync::Arc;

use anyhow::Context;
use medqa_server::{ServerConfig, ServiceContext, run_server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    medqa_telemetry::init_telemetry("medqa-server")?;

    let config = ServerConfig::from_env().context("invalid configuration")?;
    tracing::info!(?config, "starting medqa-server");

    let context = ServiceContext::from_config(&config).await?;
    run_server(Arc::new(context), &config).await
}
