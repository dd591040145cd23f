//! Sequential orchestration of one full icon run.
//!
//! Variants are processed strictly one after another against the single
//! ComfyUI instance. The first error aborts the run; variants already
//! written stay on disk but nothing is published.

use std::path::{Path, PathBuf};

use iconsmith_comfyui::api::ComfyUIService;
use iconsmith_comfyui::poll::wait_for_completion;
use iconsmith_core::naming::run_prefix;
use iconsmith_core::prompts::PromptConfig;
use iconsmith_core::workflow::{build_workflow, validate_references};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::finalize::finalize_variant;

/// A variant that made it through every stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedVariant {
    pub name: String,
    pub prompt_id: String,
    /// Normalized PNG on local disk.
    pub path: PathBuf,
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// In prompt order.
    pub variants: Vec<GeneratedVariant>,
    /// Variant file that was published.
    pub selected: PathBuf,
    /// Copy of `selected`.
    pub destination: PathBuf,
}

/// Generate every configured variant, then publish the selected one.
pub async fn run_pipeline<S>(
    service: &S,
    config: &PipelineConfig,
) -> Result<RunSummary, PipelineError>
where
    S: ComfyUIService + ?Sized,
{
    run_pipeline_with(service, config, |_| {}).await
}

/// [`run_pipeline`], calling `on_saved` as soon as each variant is on disk.
///
/// Variants saved before a failure have already been reported when the
/// error is returned.
pub async fn run_pipeline_with<S, F>(
    service: &S,
    config: &PipelineConfig,
    mut on_saved: F,
) -> Result<RunSummary, PipelineError>
where
    S: ComfyUIService + ?Sized,
    F: FnMut(&GeneratedVariant),
{
    config.validate()?;

    let mut variants = Vec::with_capacity(config.prompts.len());
    for prompt in &config.prompts {
        let variant = generate_variant(service, config, prompt).await?;
        on_saved(&variant);
        variants.push(variant);
    }

    let generated: Vec<PathBuf> = variants.iter().map(|v| v.path.clone()).collect();
    let preferred = config.selected_path();
    let selected = select_variant(&preferred, &generated)?.to_path_buf();

    publish(&selected, &config.destination).await?;
    tracing::info!(
        selected = %selected.display(),
        destination = %config.destination.display(),
        "Published icon",
    );

    Ok(RunSummary {
        variants,
        selected,
        destination: config.destination.clone(),
    })
}

/// Build, submit, await and finalize a single prompt configuration.
pub async fn generate_variant<S>(
    service: &S,
    config: &PipelineConfig,
    prompt: &PromptConfig,
) -> Result<GeneratedVariant, PipelineError>
where
    S: ComfyUIService + ?Sized,
{
    let prefix = run_prefix(
        &config.run_prefix_stem,
        &prompt.name,
        chrono::Utc::now().timestamp_millis(),
    );
    let workflow = build_workflow(&config.template, prompt, &prefix);
    validate_references(&workflow)?;

    let submitted = service.submit_workflow(&workflow).await?;
    tracing::info!(
        variant = %prompt.name,
        seed = prompt.seed,
        prompt_id = %submitted.prompt_id,
        queue_number = ?submitted.number,
        filename_prefix = %prefix,
        "Workflow queued",
    );

    let entry = wait_for_completion(service, &submitted.prompt_id, &config.poll).await?;

    let path = config.variant_path(&prompt.name);
    finalize_variant(
        service,
        &prompt.name,
        &submitted.prompt_id,
        &entry,
        &path,
        config.output_size,
    )
    .await?;

    tracing::info!(variant = %prompt.name, path = %path.display(), "Saved variant");

    Ok(GeneratedVariant {
        name: prompt.name.clone(),
        prompt_id: submitted.prompt_id,
        path,
    })
}

/// Pick the file to publish.
///
/// `preferred` wins when it exists on disk; otherwise the first generated
/// path is used. Fails with [`PipelineError::NoVariantsGenerated`] only
/// when the preferred file is absent and nothing was generated.
pub fn select_variant<'a>(
    preferred: &'a Path,
    generated: &'a [PathBuf],
) -> Result<&'a Path, PipelineError> {
    if preferred.is_file() {
        return Ok(preferred);
    }
    match generated.first() {
        Some(first) => {
            tracing::warn!(
                preferred = %preferred.display(),
                fallback = %first.display(),
                "Preferred variant missing, falling back to first generated",
            );
            Ok(first)
        }
        None => Err(PipelineError::NoVariantsGenerated),
    }
}

/// Copy `selected` byte-for-byte to `destination`, creating parent dirs.
async fn publish(selected: &Path, destination: &Path) -> Result<(), PipelineError> {
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(PipelineError::io(parent))?;
    }
    tokio::fs::copy(selected, destination)
        .await
        .map_err(PipelineError::io(destination))?;
    Ok(())
}
