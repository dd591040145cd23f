//! Prompt configurations driving one generation run each.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// One candidate icon request.
///
/// `primary_text` feeds the short CLIP-L encoder input and
/// `secondary_text` the long T5-XXL input of the Flux text encoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Variant name, e.g. `v2`. Used in output filenames.
    pub name: String,
    /// Sampler seed.
    pub seed: u64,
    pub primary_text: String,
    pub secondary_text: String,
}

impl PromptConfig {
    pub fn new(
        name: impl Into<String>,
        seed: u64,
        primary_text: impl Into<String>,
        secondary_text: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            seed,
            primary_text: primary_text.into(),
            secondary_text: secondary_text.into(),
        }
    }
}

/// The built-in variant list for the task-slice app icon.
pub fn default_prompts() -> Vec<PromptConfig> {
    vec![
        PromptConfig::new(
            "v1",
            86231,
            "app icon, white checklist sliced into five blocks on solid blue background, \
             clean geometric, centered, minimal flat design, no text",
            "a premium mobile app icon on solid royal blue background hex 2F6BFF, \
             centered white rounded square memo card, the card is visually divided into five \
             horizontal slices, each slice has a subtle checkmark hint, one slice highlighted \
             with cyan accent, clean flat vector illustration, bold and simple shapes, high \
             contrast, modern productivity app identity, no gradients, no shadows, no text, \
             no letters, square composition",
        ),
        PromptConfig::new(
            "v2",
            86232,
            "app icon, white lightning checklist with five steps on blue background, \
             minimal geometric emblem, centered, no text",
            "a modern productivity app icon, solid blue background hex 2F6BFF, a central \
             white emblem combining a checklist and forward arrow, five small step marks \
             arranged vertically to indicate five-step action plan, sharp but friendly rounded \
             geometry, one tiny accent in sky blue hex 7DD3FC, clean flat vector style, icon \
             must be highly recognizable at small size, no text, no letters, no watermark, \
             centered square icon",
        ),
        PromptConfig::new(
            "v3",
            86233,
            "app icon, white task card cut into five action strips, blue background, \
             simple bold minimal symbol, centered, no text",
            "a minimalist app icon on solid blue background hex 2F6BFF, a white rounded card \
             split into five clear action bars, bars are slightly staggered to imply quick \
             execution and progress, tiny cyan progress dot as accent, flat vector brand \
             style, clean edges, strong contrast, no gradients, no characters, no text, \
             centered composition, square format",
        ),
    ]
}

/// Reject blank and duplicate names.
///
/// Names become part of output filenames, so two prompts sharing a name
/// would overwrite each other's asset. An empty list is accepted.
pub fn validate_prompts(prompts: &[PromptConfig]) -> Result<(), CoreError> {
    let mut seen: Vec<&str> = Vec::with_capacity(prompts.len());
    for prompt in prompts {
        let name = prompt.name.trim();
        if name.is_empty() {
            return Err(CoreError::Validation(
                "Prompt configuration name must not be empty".to_string(),
            ));
        }
        if seen.contains(&name) {
            return Err(CoreError::Validation(format!(
                "Duplicate prompt configuration name '{name}'"
            )));
        }
        seen.push(name);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn default_prompts_are_valid() {
        assert!(validate_prompts(&default_prompts()).is_ok());
    }

    #[test]
    fn default_prompts_keep_declared_order() {
        let names: Vec<_> = default_prompts().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["v1", "v2", "v3"]);
    }

    #[test]
    fn default_seeds_are_distinct() {
        let seeds: Vec<_> = default_prompts().iter().map(|p| p.seed).collect();
        assert_eq!(seeds, vec![86231, 86232, 86233]);
    }

    #[test]
    fn empty_list_accepted() {
        assert!(validate_prompts(&[]).is_ok());
    }

    #[test]
    fn blank_name_rejected() {
        let prompts = vec![PromptConfig::new("  ", 1, "a", "b")];
        assert_matches!(validate_prompts(&prompts), Err(CoreError::Validation(_)));
    }

    #[test]
    fn duplicate_name_rejected() {
        let prompts = vec![
            PromptConfig::new("v1", 1, "a", "b"),
            PromptConfig::new("v1", 2, "c", "d"),
        ];
        let err = validate_prompts(&prompts).unwrap_err().to_string();
        assert!(err.contains("Duplicate"));
    }
}
