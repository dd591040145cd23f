//! Domain types shared by the icon generation pipeline.
//!
//! Prompt configurations, the ComfyUI workflow template and its reference
//! validator, and the deterministic naming rules for generated assets.

pub mod error;
pub mod naming;
pub mod prompts;
pub mod workflow;
