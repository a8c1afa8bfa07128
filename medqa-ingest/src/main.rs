use anyhow::Context;
use clap::Parser;
use medqa_ingest::{IngestArgs, run};
use medqa_rag::open_embedding_provider;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    medqa_telemetry::init_telemetry("medqa-ingest")?;

    let args = IngestArgs::parse();
    let backend = args.embedding_backend()?;
    println!("🔧 Loading embedding model ({})...", backend.label());
    let provider = open_embedding_provider(&backend)
        .await
        .with_context(|| format!("failed to initialise embedding backend '{}'", backend.label()))?;

    run(&args, provider).await?;
    Ok(())
}
