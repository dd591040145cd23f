use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iconsmith_pipeline::{run_pipeline_with, GeneratedVariant, PipelineConfig};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "iconsmith=info,iconsmith_pipeline=info,iconsmith_comfyui=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = PipelineConfig::from_env()?;
    let api = config.comfyui_api()?;

    tracing::info!(
        comfyui_url = %api.api_url(),
        client_id = %api.client_id(),
        variants = config.prompts.len(),
        "Starting icon generation",
    );

    let saved = |variant: &GeneratedVariant| println!("Saved: {}", variant.path.display());
    let summary = match run_pipeline_with(&api, &config, saved).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!(error = %e, "Icon generation failed");
            return Err(e.into());
        }
    };

    println!("Final icon: {}", summary.destination.display());

    Ok(())
}
