use std::path::PathBuf;
use std::time::Duration;

use iconsmith_comfyui::api::{ComfyUIApi, ComfyUIApiError};
use iconsmith_comfyui::poll::PollConfig;
use iconsmith_core::error::CoreError;
use iconsmith_core::naming::variant_filename;
use iconsmith_core::prompts::{default_prompts, validate_prompts, PromptConfig};
use iconsmith_core::workflow::WorkflowTemplate;

/// Everything a pipeline run needs, passed explicitly to the driver.
///
/// [`Default`] reproduces the built-in task-slice setup; tests override
/// the endpoint and paths.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// ComfyUI HTTP base URL.
    pub comfyui_url: String,
    /// Directory receiving the normalized variants.
    pub asset_dir: PathBuf,
    /// Filename prefix of normalized variants (`{prefix}-{name}.png`).
    pub asset_prefix: String,
    /// Stem of the remote `SaveImage` filename prefix.
    pub run_prefix_stem: String,
    /// Variant published when its file exists.
    pub selected_variant: String,
    /// Where the published icon is copied to.
    pub destination: PathBuf,
    /// Edge length of the square output in pixels.
    pub output_size: u32,
    pub poll: PollConfig,
    /// Per-request HTTP timeout.
    pub http_timeout: Duration,
    pub prompts: Vec<PromptConfig>,
    pub template: WorkflowTemplate,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            comfyui_url: "http://127.0.0.1:8188".to_string(),
            asset_dir: PathBuf::from("assets/icons"),
            asset_prefix: "task-slice".to_string(),
            run_prefix_stem: "task_slice".to_string(),
            selected_variant: "v2".to_string(),
            destination: PathBuf::from("app-logos/task-slice.png"),
            output_size: 600,
            poll: PollConfig::default(),
            http_timeout: Duration::from_secs(30),
            prompts: default_prompts(),
            template: WorkflowTemplate::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                    |
    /// |-------------------------|----------------------------|
    /// | `COMFYUI_URL`           | `http://127.0.0.1:8188`    |
    /// | `ICON_ASSET_DIR`        | `assets/icons`             |
    /// | `ICON_ASSET_PREFIX`     | `task-slice`               |
    /// | `ICON_RUN_PREFIX`       | `task_slice`               |
    /// | `ICON_SELECTED_VARIANT` | `v2`                       |
    /// | `ICON_DESTINATION`      | `app-logos/task-slice.png` |
    /// | `ICON_SIZE`             | `600`                      |
    /// | `POLL_TIMEOUT_SECS`     | `240`                      |
    /// | `POLL_INTERVAL_SECS`    | `2`                        |
    /// | `HTTP_TIMEOUT_SECS`     | `30`                       |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let defaults = Self::default();
        let string = |key: &str, default: String| lookup(key).unwrap_or(default);

        let config = Self {
            comfyui_url: string("COMFYUI_URL", defaults.comfyui_url),
            asset_dir: lookup("ICON_ASSET_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.asset_dir),
            asset_prefix: string("ICON_ASSET_PREFIX", defaults.asset_prefix),
            run_prefix_stem: string("ICON_RUN_PREFIX", defaults.run_prefix_stem),
            selected_variant: string("ICON_SELECTED_VARIANT", defaults.selected_variant),
            destination: lookup("ICON_DESTINATION")
                .map(PathBuf::from)
                .unwrap_or(defaults.destination),
            output_size: parse_var(&lookup, "ICON_SIZE", defaults.output_size)?,
            poll: PollConfig {
                timeout: secs_var(&lookup, "POLL_TIMEOUT_SECS", defaults.poll.timeout)?,
                interval: secs_var(&lookup, "POLL_INTERVAL_SECS", defaults.poll.interval)?,
            },
            http_timeout: secs_var(&lookup, "HTTP_TIMEOUT_SECS", defaults.http_timeout)?,
            prompts: defaults.prompts,
            template: defaults.template,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.output_size == 0 {
            return Err(CoreError::Validation(
                "ICON_SIZE must be greater than zero".to_string(),
            ));
        }
        if self.poll.interval.is_zero() {
            return Err(CoreError::Validation(
                "POLL_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }
        if self.comfyui_url.trim().is_empty() {
            return Err(CoreError::Validation(
                "COMFYUI_URL must not be empty".to_string(),
            ));
        }
        validate_prompts(&self.prompts)
    }

    /// Deterministic local path of a variant's normalized PNG.
    pub fn variant_path(&self, variant: &str) -> PathBuf {
        self.asset_dir
            .join(variant_filename(&self.asset_prefix, variant))
    }

    /// Path of the variant preferred for publishing.
    pub fn selected_path(&self) -> PathBuf {
        self.variant_path(&self.selected_variant)
    }

    /// HTTP client for the configured ComfyUI instance.
    pub fn comfyui_api(&self) -> Result<ComfyUIApi, ComfyUIApiError> {
        let client = reqwest::Client::builder()
            .timeout(self.http_timeout)
            .build()?;
        Ok(ComfyUIApi::with_client(client, self.comfyui_url.clone()))
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, CoreError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            CoreError::Validation(format!("{key} must be a non-negative integer, got '{raw}'"))
        }),
    }
}

fn secs_var(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration, CoreError> {
    parse_var(lookup, key, default.as_secs()).map(Duration::from_secs)
}
