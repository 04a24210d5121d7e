//! External command-line capabilities: page rasterisation and OCR.
//!
//! The conversion core only needs two functional contracts,
//! [`PageRasterizer`] and [`OcrExtractor`]. The bundled implementations shell
//! out to poppler's `pdftoppm` and to `tesseract`; either may be missing on a
//! given machine, which diagnostics report through `is_available`.
//!
//! ## Why shell out instead of linking?
//!
//! Both tools are ubiquitous in package managers, and running them as child
//! processes keeps native libraries out of the build. Each invocation works
//! in its own [`tempfile::TempDir`], removed on drop on every exit path.

pub mod pdftoppm;
pub mod tesseract;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::config::Settings;
use crate::error::Pdf2MdError;

pub use pdftoppm::PdftoppmRasterizer;
pub use tesseract::TesseractOcr;

/// Given PDF bytes, produce one PNG data URL per page in page order.
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    async fn rasterize(&self, pdf_bytes: &[u8], settings: &Settings) -> Result<Vec<String>, Pdf2MdError>;

    async fn is_available(&self, settings: &Settings) -> bool;
}

/// Tesseract knobs, read from [`Settings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrOptions {
    /// Executable path; empty means look it up on `PATH`.
    pub binary: String,
    pub language: String,
    pub engine_mode: u8,
    pub page_seg_mode: u8,
}

impl OcrOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            binary: settings.tesseract_path.clone(),
            language: settings.ocr_language.clone(),
            engine_mode: settings.ocr_engine_mode,
            page_seg_mode: settings.ocr_page_seg_mode,
        }
    }
}

/// Given image files, produce their text in file order.
#[async_trait]
pub trait OcrExtractor: Send + Sync {
    async fn extract(&self, image_paths: &[PathBuf], options: &OcrOptions) -> Result<String, Pdf2MdError>;

    async fn is_available(&self, settings: &Settings) -> bool;
}

/// Configured path, or the bare tool name for a `PATH` lookup.
pub(crate) fn resolve_binary(configured: &str, default_name: &str) -> String {
    let configured = configured.trim();
    if configured.is_empty() {
        default_name.to_string()
    } else {
        configured.to_string()
    }
}

fn install_hint(tool: &str) -> &'static str {
    match tool {
        "pdftoppm" => "Install poppler (macOS: brew install poppler, Linux: apt-get install poppler-utils) or set its path in the settings.",
        "tesseract" => "Install tesseract (macOS: brew install tesseract, Linux: apt-get install tesseract-ocr) or set its path in the settings.",
        _ => "Check that it is installed and on PATH.",
    }
}

/// Run `binary args…` to completion and capture its output.
///
/// A missing executable is [`Pdf2MdError::ToolNotFound`]; a non-zero exit is
/// left to the caller, which knows which error family it belongs to.
pub(crate) async fn run_tool<S: AsRef<std::ffi::OsStr>>(
    tool: &str,
    binary: &str,
    args: &[S],
) -> Result<Output, Pdf2MdError> {
    debug!(tool, binary, "Running external tool");
    Command::new(binary)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => Pdf2MdError::ToolNotFound {
                tool: tool.to_string(),
                path: binary.to_string(),
                hint: install_hint(tool).to_string(),
            },
            _ => Pdf2MdError::Internal(format!("failed to run {tool}: {e}")),
        })
}

/// True when `binary <flag>` starts and exits successfully.
pub(crate) async fn probe(tool: &str, binary: &str, flag: &str) -> bool {
    match run_tool(tool, binary, &[flag]).await {
        Ok(out) => out.status.success(),
        Err(e) => {
            debug!("{} probe failed: {}", tool, e);
            false
        }
    }
}

pub(crate) fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
