//! Page rasterisation through poppler's `pdftoppm`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::TempDir;
use tracing::{debug, info};

use super::{file_name, probe, resolve_binary, run_tool, stderr_text, PageRasterizer};
use crate::config::Settings;
use crate::error::Pdf2MdError;
use crate::pipeline::encode::to_data_url;

const TOOL: &str = "pdftoppm";
const OUTPUT_PREFIX: &str = "page";

/// Renders every page to PNG at the configured DPI, scaled so the longest
/// edge is at most `pdf_image_max_width` pixels.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdftoppmRasterizer;

impl PdftoppmRasterizer {
    pub fn new() -> Self {
        Self
    }
}

/// Command-line arguments for one run.
pub fn pdftoppm_args(settings: &Settings, input: &Path, output_prefix: &Path) -> Vec<String> {
    vec![
        "-png".into(),
        "-r".into(),
        settings.pdf_image_dpi.to_string(),
        "-scale-to".into(),
        settings.pdf_image_max_width.to_string(),
        input.to_string_lossy().into_owned(),
        output_prefix.to_string_lossy().into_owned(),
    ]
}

/// Page number embedded in `page-07.png`.
fn page_number(name: &str) -> Option<u32> {
    name.strip_suffix(".png")?.rsplit('-').next()?.parse().ok()
}

/// PNGs produced under `dir` for `prefix`, in page order.
pub(crate) fn collect_pages(dir: &Path, prefix: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut pages: Vec<(u32, PathBuf)> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter_map(|path| {
            let name = file_name(&path);
            if name.starts_with(prefix) && name.ends_with(".png") {
                page_number(&name).map(|n| (n, path))
            } else {
                None
            }
        })
        .collect();
    pages.sort_by_key(|(n, _)| *n);
    Ok(pages.into_iter().map(|(_, p)| p).collect())
}

#[async_trait]
impl PageRasterizer for PdftoppmRasterizer {
    async fn rasterize(&self, pdf_bytes: &[u8], settings: &Settings) -> Result<Vec<String>, Pdf2MdError> {
        let binary = resolve_binary(&settings.poppler_pdftoppm_path, TOOL);
        let extraction = |detail: String| Pdf2MdError::ExtractionFailed { detail };

        // Dropped on every return path below, taking the PDF and PNGs with it.
        let work = TempDir::with_prefix("pdf2md-").map_err(|e| extraction(e.to_string()))?;
        let input = work.path().join("input.pdf");
        tokio::fs::write(&input, pdf_bytes)
            .await
            .map_err(|e| extraction(format!("could not stage PDF: {e}")))?;

        let args = pdftoppm_args(settings, &input, &work.path().join(OUTPUT_PREFIX));
        debug!("Executing: {} {}", binary, args.join(" "));
        let output = run_tool(TOOL, &binary, &args).await?;
        if !output.status.success() {
            return Err(extraction(format!(
                "pdftoppm exited with {}: {}",
                output.status,
                stderr_text(&output)
            )));
        }

        let pages = collect_pages(work.path(), OUTPUT_PREFIX).map_err(|e| extraction(e.to_string()))?;
        if pages.is_empty() {
            return Err(extraction("no PNG files were generated by pdftoppm".into()));
        }

        let mut images = Vec::with_capacity(pages.len());
        for path in &pages {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| extraction(format!("could not read {}: {e}", file_name(path))))?;
            images.push(to_data_url(&bytes, "image/png"));
        }

        info!("Rasterised {} page(s) at {} DPI", images.len(), settings.pdf_image_dpi);
        Ok(images)
    }

    async fn is_available(&self, settings: &Settings) -> bool {
        probe(TOOL, &resolve_binary(&settings.poppler_pdftoppm_path, TOOL), "-v").await
    }
}
