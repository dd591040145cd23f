use std::path::PathBuf;

use iconsmith_comfyui::api::ComfyUIApiError;
use iconsmith_core::error::CoreError;

/// Errors that abort a pipeline run. None of them are retried.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Bad configuration or an invalid workflow graph.
    #[error(transparent)]
    Invalid(#[from] CoreError),

    /// Submission, polling or download against ComfyUI failed.
    #[error(transparent)]
    Service(#[from] ComfyUIApiError),

    #[error("Prompt {prompt_id} for variant '{variant}' produced no image output")]
    NoImageProduced { variant: String, prompt_id: String },

    #[error("No variants were generated")]
    NoVariantsGenerated,

    #[error("Image processing failed for {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }

    pub(crate) fn image(path: impl Into<PathBuf>) -> impl FnOnce(image::ImageError) -> Self {
        let path = path.into();
        move |source| Self::Image { path, source }
    }
}
