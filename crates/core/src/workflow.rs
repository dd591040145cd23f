//! Flux Schnell text-to-image workflow in ComfyUI API format.
//!
//! The graph topology is fixed; only the prompt texts, seed and output
//! filename prefix vary per run. [`validate_references`] checks that every
//! link input points at a node present in the graph.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::prompts::PromptConfig;

// ---------------------------------------------------------------------------
// Node ids
// ---------------------------------------------------------------------------

pub const NODE_UNET_LOADER: &str = "1";
pub const NODE_CLIP_LOADER: &str = "2";
pub const NODE_POSITIVE_ENCODE: &str = "3";
pub const NODE_NEGATIVE_ENCODE: &str = "4";
pub const NODE_EMPTY_LATENT: &str = "5";
pub const NODE_SAMPLER: &str = "6";
pub const NODE_VAE_LOADER: &str = "7";
pub const NODE_VAE_DECODE: &str = "8";
pub const NODE_SAVE_IMAGE: &str = "9";

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

/// Model files and sampler settings baked into every submitted graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub unet_name: String,
    pub clip_name1: String,
    pub clip_name2: String,
    pub vae_name: String,
    /// Latent canvas width in pixels.
    pub width: u32,
    /// Latent canvas height in pixels.
    pub height: u32,
    pub steps: u32,
    pub cfg: f64,
    /// Flux guidance applied by both text encoders.
    pub guidance: f64,
    pub sampler_name: String,
    pub scheduler: String,
    pub denoise: f64,
}

impl Default for WorkflowTemplate {
    fn default() -> Self {
        Self {
            unet_name: "flux1-schnell-Q4_K_S.gguf".to_string(),
            clip_name1: "clip_l.safetensors".to_string(),
            clip_name2: "t5-v1_1-xxl-encoder-Q4_K_M.gguf".to_string(),
            vae_name: "ae.safetensors".to_string(),
            width: 512,
            height: 512,
            steps: 4,
            cfg: 1.0,
            guidance: 3.5,
            sampler_name: "euler".to_string(),
            scheduler: "simple".to_string(),
            denoise: 1.0,
        }
    }
}

/// Link input `[source_node_id, output_slot]`.
fn link(node_id: &str, slot: u32) -> serde_json::Value {
    serde_json::json!([node_id, slot])
}

/// Build the job graph for one prompt configuration.
///
/// Node 4 is the unconditioned branch: both encoder texts are empty and it
/// feeds the sampler's `negative` input.
pub fn build_workflow(
    template: &WorkflowTemplate,
    prompt: &PromptConfig,
    filename_prefix: &str,
) -> serde_json::Value {
    serde_json::json!({
        NODE_UNET_LOADER: {
            "class_type": "UnetLoaderGGUF",
            "inputs": { "unet_name": template.unet_name },
        },
        NODE_CLIP_LOADER: {
            "class_type": "DualCLIPLoaderGGUF",
            "inputs": {
                "clip_name1": template.clip_name1,
                "clip_name2": template.clip_name2,
                "type": "flux",
            },
        },
        NODE_POSITIVE_ENCODE: {
            "class_type": "CLIPTextEncodeFlux",
            "inputs": {
                "clip": link(NODE_CLIP_LOADER, 0),
                "clip_l": prompt.primary_text,
                "t5xxl": prompt.secondary_text,
                "guidance": template.guidance,
            },
        },
        NODE_NEGATIVE_ENCODE: {
            "class_type": "CLIPTextEncodeFlux",
            "inputs": {
                "clip": link(NODE_CLIP_LOADER, 0),
                "clip_l": "",
                "t5xxl": "",
                "guidance": template.guidance,
            },
        },
        NODE_EMPTY_LATENT: {
            "class_type": "EmptySD3LatentImage",
            "inputs": {
                "width": template.width,
                "height": template.height,
                "batch_size": 1,
            },
        },
        NODE_SAMPLER: {
            "class_type": "KSampler",
            "inputs": {
                "model": link(NODE_UNET_LOADER, 0),
                "seed": prompt.seed,
                "steps": template.steps,
                "cfg": template.cfg,
                "sampler_name": template.sampler_name,
                "scheduler": template.scheduler,
                "positive": link(NODE_POSITIVE_ENCODE, 0),
                "negative": link(NODE_NEGATIVE_ENCODE, 0),
                "latent_image": link(NODE_EMPTY_LATENT, 0),
                "denoise": template.denoise,
            },
        },
        NODE_VAE_LOADER: {
            "class_type": "VAELoader",
            "inputs": { "vae_name": template.vae_name },
        },
        NODE_VAE_DECODE: {
            "class_type": "VAEDecode",
            "inputs": {
                "samples": link(NODE_SAMPLER, 0),
                "vae": link(NODE_VAE_LOADER, 0),
            },
        },
        NODE_SAVE_IMAGE: {
            "class_type": "SaveImage",
            "inputs": {
                "images": link(NODE_VAE_DECODE, 0),
                "filename_prefix": filename_prefix,
            },
        },
    })
}

// ---------------------------------------------------------------------------
// Reference validation
// ---------------------------------------------------------------------------

/// An input wired to another node's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLink {
    /// Node providing the value.
    pub from_node: String,
    pub from_output: u64,
    /// Node consuming the value.
    pub to_node: String,
    pub to_input: String,
}

/// Collect every link input in the graph.
///
/// ComfyUI encodes a link as a two-element array `[node_id, slot]` where the
/// id is a string (or, in hand-written graphs, an integer).
pub fn collect_links(workflow: &serde_json::Value) -> Result<Vec<NodeLink>, CoreError> {
    let nodes = workflow
        .as_object()
        .ok_or_else(|| CoreError::Validation("Workflow JSON must be an object".to_string()))?;

    let mut links = Vec::new();
    for (node_id, node) in nodes {
        if node.get("class_type").and_then(|v| v.as_str()).is_none() {
            return Err(CoreError::Validation(format!(
                "Node '{node_id}' is missing required 'class_type' field"
            )));
        }

        let Some(inputs) = node.get("inputs").and_then(|v| v.as_object()) else {
            continue;
        };

        for (input_name, value) in inputs {
            let Some([source, slot]) = value.as_array().map(Vec::as_slice) else {
                continue;
            };
            let from_node = match (source.as_str(), source.as_u64()) {
                (Some(s), _) => s.to_string(),
                (None, Some(n)) => n.to_string(),
                _ => continue,
            };
            let Some(from_output) = slot.as_u64() else {
                continue;
            };
            links.push(NodeLink {
                from_node,
                from_output,
                to_node: node_id.clone(),
                to_input: input_name.clone(),
            });
        }
    }

    Ok(links)
}

/// Ensure every link input names a node that exists in the same graph.
pub fn validate_references(workflow: &serde_json::Value) -> Result<(), CoreError> {
    let nodes = workflow
        .as_object()
        .ok_or_else(|| CoreError::Validation("Workflow JSON must be an object".to_string()))?;

    if nodes.is_empty() {
        return Err(CoreError::Validation(
            "Workflow JSON must contain at least one node".to_string(),
        ));
    }

    for link in &collect_links(workflow)? {
        if !nodes.contains_key(&link.from_node) {
            return Err(CoreError::Validation(format!(
                "Input '{}' of node '{}' references missing node '{}'",
                link.to_input, link.to_node, link.from_node
            )));
        }
    }

    Ok(())
}
