//! insight-service binary: configuration, component wiring, serve.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use insight_service::{build_state, serve, AnthropicClient, LlmClient, ServiceConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServiceConfig::from_env()?;
    let llm: Arc<dyn LlmClient> = Arc::new(AnthropicClient::new(&config)?);
    let state = build_state(config, llm)?;

    serve(state).await
}
