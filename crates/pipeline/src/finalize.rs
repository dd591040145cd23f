//! Download a prompt's first output image and normalize it to a square PNG.

use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;

use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::{self, FilterType};
use image::ImageReader;

use iconsmith_comfyui::api::ComfyUIService;
use iconsmith_comfyui::history::HistoryEntry;
use iconsmith_core::naming::{scratch_prefix, SCRATCH_SUFFIX};

use crate::error::PipelineError;

/// Fetch the first image of `entry` and write it, normalized, to `path`.
///
/// Fails with [`PipelineError::NoImageProduced`] when no output node
/// reported an image; nothing is written in that case.
pub async fn finalize_variant<S>(
    service: &S,
    variant: &str,
    prompt_id: &str,
    entry: &HistoryEntry,
    path: &Path,
    size: u32,
) -> Result<(), PipelineError>
where
    S: ComfyUIService + ?Sized,
{
    let image = entry
        .first_image()?
        .ok_or_else(|| PipelineError::NoImageProduced {
            variant: variant.to_string(),
            prompt_id: prompt_id.to_string(),
        })?;

    tracing::debug!(
        variant,
        prompt_id,
        filename = %image.filename,
        subfolder = %image.subfolder,
        folder_type = %image.folder_type,
        "Downloading output image",
    );
    let raw = service.fetch_image(&image).await?;

    write_normalized_png(&raw, path, size)
}

/// Decode `raw`, convert to RGBA, resize to `size`x`size` with Lanczos3 and
/// write a best-compression PNG to `path`.
///
/// The raw bytes pass through a scratch file next to `path`. The scratch
/// file is owned by a [`tempfile::NamedTempFile`] guard and removed on
/// every return path. The final file is only created once encoding has
/// succeeded.
pub fn write_normalized_png(raw: &[u8], path: &Path, size: u32) -> Result<(), PipelineError> {
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(PipelineError::io(parent))?;

    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("asset");

    let mut scratch = tempfile::Builder::new()
        .prefix(&scratch_prefix(filename))
        .suffix(SCRATCH_SUFFIX)
        .tempfile_in(parent)
        .map_err(PipelineError::io(parent))?;
    let scratch_path = scratch.path().to_path_buf();
    scratch
        .write_all(raw)
        .map_err(PipelineError::io(&scratch_path))?;
    scratch.flush().map_err(PipelineError::io(&scratch_path))?;

    let decoded = ImageReader::open(&scratch_path)
        .map_err(PipelineError::io(&scratch_path))?
        .with_guessed_format()
        .map_err(PipelineError::io(&scratch_path))?
        .decode()
        .map_err(PipelineError::image(&scratch_path))?;

    let resized = imageops::resize(&decoded.to_rgba8(), size, size, FilterType::Lanczos3);

    let mut encoded = Cursor::new(Vec::new());
    let encoder =
        PngEncoder::new_with_quality(&mut encoded, CompressionType::Best, PngFilter::Adaptive);
    resized
        .write_with_encoder(encoder)
        .map_err(PipelineError::image(path))?;

    fs::write(path, encoded.into_inner()).map_err(PipelineError::io(path))?;

    tracing::debug!(
        path = %path.display(),
        source_width = decoded.width(),
        source_height = decoded.height(),
        size,
        "Wrote normalized PNG",
    );
    Ok(())
}
