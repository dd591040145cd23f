//! Icon generation pipeline.
//!
//! For each prompt configuration: build the workflow, queue it on ComfyUI,
//! wait for completion, download the first image and normalize it to a
//! square PNG. Afterwards one variant is copied to the destination path.

pub mod config;
pub mod driver;
pub mod error;
pub mod finalize;

pub use config::PipelineConfig;
pub use driver::{run_pipeline, run_pipeline_with, GeneratedVariant, RunSummary};
pub use error::PipelineError;
