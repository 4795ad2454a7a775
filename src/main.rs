use std::sync::Arc;

use anyhow::Context;

use ai_image_captioner::config::AppConfig;
use ai_image_captioner::logging::init_tracing;
use ai_image_captioner::web::{create_router, AppState};
use ai_image_captioner::workflow::CaptionWorkflow;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let config = AppConfig::from_env().context("invalid configuration")?;
    init_tracing(config.log_format);

    if config.credential.is_none() {
        tracing::warn!("OPENROUTER_API_KEY is not set; caption requests will fail until it is");
    }

    let workflow = CaptionWorkflow::from_config(&config).context("failed to build HTTP clients")?;
    let options = workflow.options();
    let state = Arc::new(AppState { workflow });
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(
        addr = %config.bind_addr,
        model = %config.caption.model,
        speech = options.enable_speech,
        preview_width = options.display_resize_width,
        "Image captioner listening"
    );

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
