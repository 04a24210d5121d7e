//! OCR through the `tesseract` command-line tool.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::{file_name, probe, resolve_binary, run_tool, stderr_text, OcrExtractor, OcrOptions};
use crate::config::Settings;
use crate::error::Pdf2MdError;
use crate::message::page_separator;

const TOOL: &str = "tesseract";

#[derive(Debug, Clone, Copy, Default)]
pub struct TesseractOcr;

impl TesseractOcr {
    pub fn new() -> Self {
        Self
    }
}

/// `tesseract <image> stdout -l <lang> --oem <n> --psm <n>`
pub fn tesseract_args(image: &Path, options: &OcrOptions) -> Vec<String> {
    vec![
        image.to_string_lossy().into_owned(),
        "stdout".into(),
        "-l".into(),
        options.language.clone(),
        "--oem".into(),
        options.engine_mode.to_string(),
        "--psm".into(),
        options.page_seg_mode.to_string(),
    ]
}

/// Page texts joined with the same separators the vision prompts use.
pub fn join_pages(texts: &[String]) -> String {
    let mut out = String::new();
    for (index, text) in texts.iter().enumerate() {
        if index > 0 {
            out.push_str(&page_separator(index + 1));
        }
        out.push_str(text.trim());
    }
    out
}

#[async_trait]
impl OcrExtractor for TesseractOcr {
    async fn extract(&self, image_paths: &[PathBuf], options: &OcrOptions) -> Result<String, Pdf2MdError> {
        let binary = resolve_binary(&options.binary, TOOL);
        let mut texts = Vec::with_capacity(image_paths.len());

        for path in image_paths {
            let output = run_tool(TOOL, &binary, &tesseract_args(path, options)).await?;
            if !output.status.success() {
                return Err(Pdf2MdError::OcrFailed {
                    detail: format!("{}: {}", file_name(path), stderr_text(&output)),
                });
            }
            let text = String::from_utf8_lossy(&output.stdout).into_owned();
            debug!("OCR {} → {} chars", file_name(path), text.len());
            texts.push(text);
        }

        Ok(join_pages(&texts))
    }

    async fn is_available(&self, settings: &Settings) -> bool {
        probe(TOOL, &resolve_binary(&settings.tesseract_path, TOOL), "--version").await
    }
}
