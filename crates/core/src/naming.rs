//! Naming conventions for generated icon assets.
//!
//! Local filenames are deterministic per variant so reruns overwrite the
//! previous candidate. Remote filename prefixes carry a timestamp so runs
//! never collide inside the ComfyUI output folder.

/// File extension of every normalized asset.
pub const ASSET_EXTENSION: &str = "png";

/// Suffix of the scratch file holding raw downloaded bytes.
pub const SCRATCH_SUFFIX: &str = ".tmp.png";

/// Local filename for a normalized variant.
///
/// Convention: `{asset_prefix}-{variant}.png`
///
/// ```
/// use iconsmith_core::naming::variant_filename;
///
/// assert_eq!(variant_filename("task-slice", "v2"), "task-slice-v2.png");
/// ```
pub fn variant_filename(asset_prefix: &str, variant: &str) -> String {
    format!("{asset_prefix}-{variant}.{ASSET_EXTENSION}")
}

/// `filename_prefix` handed to the remote `SaveImage` node.
///
/// Convention: `{stem}_{variant}_{unix_millis}`
///
/// ```
/// use iconsmith_core::naming::run_prefix;
///
/// assert_eq!(run_prefix("task_slice", "v1", 1_700_000_000_123), "task_slice_v1_1700000000123");
/// ```
pub fn run_prefix(stem: &str, variant: &str, unix_millis: i64) -> String {
    format!("{stem}_{variant}_{unix_millis}")
}

/// Prefix for the scratch file holding raw downloaded bytes.
///
/// The scratch file lives next to the final asset and is named after its
/// stem: `task-slice-v1.png` gets `task-slice-v1.<random>.tmp.png`.
pub fn scratch_prefix(final_filename: &str) -> String {
    let stem = final_filename
        .strip_suffix(&format!(".{ASSET_EXTENSION}"))
        .unwrap_or(final_filename);
    format!("{stem}.")
}
