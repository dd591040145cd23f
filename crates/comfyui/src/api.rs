//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Wraps workflow submission (`POST /prompt`), history retrieval
//! (`GET /history/{prompt_id}`) and output download (`GET /view`) using
//! [`reqwest`]. The [`ComfyUIService`] trait is the seam the pipeline
//! drives, so tests can swap in an in-memory service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;

use crate::history::ImageRef;

/// Operations the pipeline needs from a generation service.
#[async_trait]
pub trait ComfyUIService: Send + Sync {
    /// Queue a workflow and return the server-assigned handle.
    async fn submit_workflow(
        &self,
        workflow: &serde_json::Value,
    ) -> Result<SubmitResponse, ComfyUIApiError>;

    /// Raw `/history/{prompt_id}` mapping. Empty object while the prompt
    /// is still queued or running.
    async fn get_history(&self, prompt_id: &str) -> Result<serde_json::Value, ComfyUIApiError>;

    /// Download the bytes of one output artifact.
    async fn fetch_image(&self, image: &ImageRef) -> Result<Vec<u8>, ComfyUIApiError>;
}

/// HTTP client for a single ComfyUI instance.
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
    client_id: String,
}

/// Response returned by the ComfyUI `/prompt` endpoint after
/// successfully queuing a workflow.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt.
    pub prompt_id: String,
    /// Position in the execution queue.
    #[serde(default)]
    pub number: Option<i64>,
}

/// Errors from the ComfyUI client layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (connection refused, DNS, timeout).
    #[error("ComfyUI service unavailable: {0}")]
    ServiceUnavailable(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The response body could not be parsed or lacked an expected field.
    #[error("ComfyUI protocol error: {0}")]
    Protocol(String),

    /// The configured base URL cannot be turned into a request URL.
    #[error("Invalid ComfyUI URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The prompt never appeared in `/history` within the poll window.
    #[error("Prompt {prompt_id} did not complete within {waited:?}")]
    Timeout { prompt_id: String, waited: Duration },

    /// The prompt finished but ComfyUI reported an execution error.
    #[error("Prompt {prompt_id} failed: {message}")]
    JobFailed { prompt_id: String, message: String },
}

impl ComfyUIApi {
    /// Create a new API client for a ComfyUI instance.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://127.0.0.1:8188`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`]
    /// (e.g. one built with a request timeout).
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            api_url,
            client_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// HTTP API base URL without trailing slash.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Client id sent with every submission.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// `POST` target for workflow submission.
    pub fn prompt_url(&self) -> Result<Url, ComfyUIApiError> {
        self.endpoint("prompt")
    }

    /// `GET` target for the history of one prompt.
    pub fn history_url(&self, prompt_id: &str) -> Result<Url, ComfyUIApiError> {
        let mut url = self.endpoint("history")?;
        url.path_segments_mut()
            .map_err(|()| self.invalid_url("cannot be a base"))?
            .push(prompt_id);
        Ok(url)
    }

    /// `GET` target for one output artifact.
    ///
    /// The query carries `filename`, `subfolder` and `type`,
    /// form-urlencoded.
    pub fn view_url(&self, image: &ImageRef) -> Result<Url, ComfyUIApiError> {
        let mut url = self.endpoint("view")?;
        url.query_pairs_mut()
            .append_pair("filename", &image.filename)
            .append_pair("subfolder", &image.subfolder)
            .append_pair("type", &image.folder_type);
        Ok(url)
    }

    // ---- private helpers ----

    fn endpoint(&self, path: &str) -> Result<Url, ComfyUIApiError> {
        Url::parse(&format!("{}/{path}", self.api_url))
            .map_err(|e| self.invalid_url(&e.to_string()))
    }

    fn invalid_url(&self, reason: &str) -> ComfyUIApiError {
        ComfyUIApiError::InvalidUrl {
            url: self.api_url.clone(),
            reason: reason.to_string(),
        }
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ComfyUIApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    ///
    /// Decode failures are protocol errors, not transport errors.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        endpoint: &str,
    ) -> Result<T, ComfyUIApiError> {
        let response = Self::ensure_success(response).await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| {
            ComfyUIApiError::Protocol(format!("Malformed response from {endpoint}: {e}"))
        })
    }
}

#[async_trait]
impl ComfyUIService for ComfyUIApi {
    /// Sends `{"prompt": <workflow>, "client_id": <uuid>}` to `/prompt`.
    async fn submit_workflow(
        &self,
        workflow: &serde_json::Value,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": self.client_id,
        });

        let response = self
            .client
            .post(self.prompt_url()?)
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response, "/prompt").await
    }

    async fn get_history(&self, prompt_id: &str) -> Result<serde_json::Value, ComfyUIApiError> {
        let response = self
            .client
            .get(self.history_url(prompt_id)?)
            .send()
            .await?;

        Self::parse_response(response, "/history").await
    }

    async fn fetch_image(&self, image: &ImageRef) -> Result<Vec<u8>, ComfyUIApiError> {
        let response = self.client.get(self.view_url(image)?).send().await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}
