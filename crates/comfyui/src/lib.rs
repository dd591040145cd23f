//! ComfyUI REST client library.
//!
//! Provides the HTTP API wrapper used to queue workflows, typed history
//! records, and the completion poller that waits for a queued
//! prompt to show up in `/history`.

pub mod api;
pub mod history;
pub mod poll;
