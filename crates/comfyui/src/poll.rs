//! Fixed-interval completion polling.
//!
//! ComfyUI only lists a prompt under `/history` once it has finished, so
//! the poller repeatedly asks for the prompt's history until the id shows
//! up or the timeout elapses. There is no backoff and no cancellation.

use std::time::Duration;

use tokio::time::Instant;

use crate::api::{ComfyUIApiError, ComfyUIService};
use crate::history::HistoryEntry;

/// Default upper bound on how long a single prompt may take.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(240);

/// Default pause between two history queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Tunable parameters for the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Give up once this much time has passed since the first query.
    pub timeout: Duration,
    /// Sleep between queries.
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_POLL_TIMEOUT,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Wait until `prompt_id` appears in the history, then return its entry.
///
/// Fails with [`ComfyUIApiError::Timeout`] no earlier than
/// `config.timeout` and no later than one interval after it: the last
/// sleep is clamped to the time remaining. An entry whose status reports
/// an execution error fails with [`ComfyUIApiError::JobFailed`].
pub async fn wait_for_completion<S>(
    service: &S,
    prompt_id: &str,
    config: &PollConfig,
) -> Result<HistoryEntry, ComfyUIApiError>
where
    S: ComfyUIService + ?Sized,
{
    let started = Instant::now();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let history = service.get_history(prompt_id).await?;
        let entries = history.as_object().ok_or_else(|| {
            ComfyUIApiError::Protocol("History response must be a JSON object".to_string())
        })?;

        if let Some(raw) = entries.get(prompt_id) {
            let entry = HistoryEntry::from_value(raw.clone())?;
            if let Some(message) = entry.failure_message() {
                tracing::error!(prompt_id, error = %message, "Prompt failed");
                return Err(ComfyUIApiError::JobFailed {
                    prompt_id: prompt_id.to_string(),
                    message,
                });
            }
            tracing::info!(
                prompt_id,
                attempt,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Prompt completed",
            );
            return Ok(entry);
        }

        let elapsed = started.elapsed();
        if elapsed >= config.timeout {
            tracing::warn!(prompt_id, attempt, "Timed out waiting for prompt");
            return Err(ComfyUIApiError::Timeout {
                prompt_id: prompt_id.to_string(),
                waited: elapsed,
            });
        }

        tracing::debug!(
            prompt_id,
            attempt,
            elapsed_ms = elapsed.as_millis() as u64,
            "Prompt still pending",
        );
        tokio::time::sleep(config.interval.min(config.timeout - elapsed)).await;
    }
}
