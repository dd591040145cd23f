//! Typed view of a ComfyUI `/history/{prompt_id}` entry.
//!
//! ComfyUI answers with `{"<prompt_id>": {"outputs": {...}, "status": {...}}}`
//! once the prompt has left the queue. `outputs` maps output node ids to
//! whatever that node produced; image-producing nodes report an `images`
//! list of artifact descriptors.

use serde::Deserialize;

use crate::api::ComfyUIApiError;

/// Storage area ComfyUI writes `SaveImage` results to.
pub const FOLDER_TYPE_OUTPUT: &str = "output";

/// `status_str` value for a prompt that raised during execution.
const STATUS_ERROR: &str = "error";

/// Message kind carrying the exception details of a failed node.
const MESSAGE_EXECUTION_ERROR: &str = "execution_error";

/// Artifact descriptor locating one output file on the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImageRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    /// Storage area tag (`output`, `temp`, `input`).
    #[serde(rename = "type", default = "default_folder_type")]
    pub folder_type: String,
}

fn default_folder_type() -> String {
    FOLDER_TYPE_OUTPUT.to_string()
}

/// One resolved prompt in the history.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    /// Output node id -> node output, in document order.
    #[serde(default)]
    pub outputs: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub status: Option<HistoryStatus>,
}

/// Execution outcome recorded alongside the outputs.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryStatus {
    /// `success` or `error`.
    #[serde(default)]
    pub status_str: String,
    #[serde(default)]
    pub completed: bool,
    /// `[kind, payload]` pairs in emission order.
    #[serde(default)]
    pub messages: Vec<(String, serde_json::Value)>,
}

/// Payload of an `execution_error` status message.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionErrorData {
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub exception_type: String,
    #[serde(default)]
    pub exception_message: String,
}

impl HistoryEntry {
    /// Parse the raw JSON of one history entry.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ComfyUIApiError> {
        serde_json::from_value(value)
            .map_err(|e| ComfyUIApiError::Protocol(format!("Malformed history entry: {e}")))
    }

    /// Human-readable reason when ComfyUI marked the prompt as failed.
    ///
    /// A prompt failed when `status_str` is `error`, or when it did not
    /// complete and recorded an `execution_error`. Returns `None` for
    /// entries without a status record (older servers omit it).
    pub fn failure_message(&self) -> Option<String> {
        let status = self.status.as_ref()?;
        let error = status
            .messages
            .iter()
            .filter(|(kind, _)| kind == MESSAGE_EXECUTION_ERROR)
            .find_map(|(_, payload)| ExecutionErrorData::deserialize(payload).ok());

        // Servers that omit `status_str` still flag an aborted run through
        // `completed: false` plus an `execution_error` message.
        let failed = status.status_str == STATUS_ERROR || (!status.completed && error.is_some());
        if !failed {
            return None;
        }

        let detail = error
            .map(|data| match (data.node_id, data.exception_type.is_empty()) {
                (Some(node), false) => {
                    format!("{} in node {node}: {}", data.exception_type, data.exception_message)
                }
                (Some(node), true) => format!("node {node}: {}", data.exception_message),
                (None, _) => data.exception_message,
            });

        Some(detail.unwrap_or_else(|| "ComfyUI reported status 'error'".to_string()))
    }

    /// First image descriptor of the first output node that produced any.
    ///
    /// Nodes without an `images` list, or with an empty one, are skipped.
    /// Only the first descriptor of a list is parsed.
    pub fn first_image(&self) -> Result<Option<ImageRef>, ComfyUIApiError> {
        for (node_id, output) in &self.outputs {
            let Some(images) = output.get("images") else {
                continue;
            };
            let images = images.as_array().ok_or_else(|| {
                ComfyUIApiError::Protocol(format!(
                    "Image list in output of node {node_id} is not an array"
                ))
            })?;
            let Some(first) = images.first() else {
                continue;
            };
            let image = ImageRef::deserialize(first).map_err(|e| {
                ComfyUIApiError::Protocol(format!(
                    "Malformed image descriptor in output of node {node_id}: {e}"
                ))
            })?;
            return Ok(Some(image));
        }
        Ok(None)
    }
}
