//! Error types for the pdf2md-notes library.
//!
//! A single fatal error type, [`Pdf2MdError`], covers every way a conversion
//! run can stop. The variants group into the same families the orchestration
//! layer reasons about:
//!
//! * **Configuration**: missing credential or model. Raised before any
//!   network call is made.
//! * **Transient network**: connection refused, timeouts, HTTP 408/429/5xx.
//!   Retried with a fixed delay; exhaustion surfaces as
//!   [`Pdf2MdError::ChunkFailed`].
//! * **Capability mismatch**: the model cannot read images. May trigger the
//!   OCR text fallback.
//! * **Malformed response**: a 2xx reply without the expected text field.
//!   Never retried.
//! * **Cancelled**: the user asked to stop. Reported distinctly from
//!   failures and carries whatever chunk output was already produced.
//!
//! `Display` strings are short enough to show to a user. Response bodies are
//! kept on the variant for diagnostic logging only.

use std::path::PathBuf;
use thiserror::Error;

use crate::providers::heuristics;

/// All fatal errors returned by the pdf2md-notes library.
#[derive(Debug, Error)]
pub enum Pdf2MdError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// The selected provider lacks a credential, model, or endpoint.
    #[error("Provider '{provider}' is not configured: {hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The selected provider exists in the settings schema but has no backend yet.
    #[error("Provider '{provider}' is not implemented yet")]
    ProviderNotImplemented { provider: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A settings file could not be parsed or written.
    #[error("Invalid settings file '{path}': {detail}")]
    InvalidSettings { path: PathBuf, detail: String },

    // ── Provider errors ───────────────────────────────────────────────────
    /// The adapter needs at least one image and got none.
    #[error("{provider}: no images to process")]
    EmptyInput { provider: String },

    /// The backend answered with a non-2xx status.
    #[error("{provider} API error: HTTP {status}")]
    Http {
        provider: String,
        status: u16,
        body: String,
    },

    /// The request never produced an HTTP response (refused, reset, timed out).
    #[error("Request to '{url}' failed: {detail}")]
    Transport {
        url: String,
        detail: String,
        connection_refused: bool,
    },

    /// A 2xx response without the expected text field.
    #[error("{provider}: unexpected response shape ({detail})")]
    MalformedResponse { provider: String, detail: String },

    /// The backend reported that an error occurred while generating.
    #[error("{provider} reported an error: {message}")]
    Backend { provider: String, message: String },

    /// The model rejected image input.
    #[error("Model '{model}' does not appear to support images. Use a vision-capable model (e.g. llava) or enable the OCR text fallback.")]
    VisionUnsupported {
        provider: String,
        model: String,
        detail: String,
    },

    /// A chunk failed after every retry was spent.
    #[error("Request failed for chunk {chunk}/{total}: {reason}")]
    ChunkFailed {
        chunk: usize,
        total: usize,
        reason: String,
    },

    /// The run was cancelled by the caller.
    ///
    /// `partial` holds the joined output of the chunks that completed before
    /// cancellation was observed.
    #[error("Conversion cancelled after {completed_chunks} completed chunk(s)")]
    Cancelled {
        completed_chunks: usize,
        partial: String,
    },

    // ── External tool errors ──────────────────────────────────────────────
    /// Page rasterisation produced nothing or the rasteriser failed.
    #[error("Failed to extract images from PDF: {detail}\nTry the \"Process Images\" option instead.")]
    ExtractionFailed { detail: String },

    /// The OCR tool failed.
    #[error("OCR failed: {detail}")]
    OcrFailed { detail: String },

    /// An external command-line tool could not be started.
    #[error("'{tool}' was not found at '{path}'. {hint}")]
    ToolNotFound {
        tool: String,
        path: String,
        hint: String,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Source file was not found in the host store.
    #[error("File not found: '{path}'")]
    FileNotFound { path: String },

    /// The source file was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: String, magic: [u8; 4] },

    /// Reading from the host store failed.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write the output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Pdf2MdError {
    /// Whether retrying the same request may succeed.
    ///
    /// Transport failures and HTTP 408/429/5xx are transient. Everything
    /// else (bad shape, bad credentials, missing model, vision rejection)
    /// fails the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Pdf2MdError::Transport { .. } => true,
            Pdf2MdError::Http { status, .. } => {
                (*status == 408 || *status == 429 || *status >= 500) && !self.is_vision_rejection()
            }
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Pdf2MdError::Cancelled { .. })
    }

    /// True when the backend is simply not running.
    pub fn is_connection_refused(&self) -> bool {
        match self {
            Pdf2MdError::Transport {
                connection_refused, ..
            } => *connection_refused,
            other => heuristics::is_connection_refused(&other.diagnostic_text()),
        }
    }

    /// True when the error text carries a "model cannot take images" signature.
    pub fn is_vision_rejection(&self) -> bool {
        matches!(self, Pdf2MdError::VisionUnsupported { .. })
            || heuristics::is_vision_unsupported_error(&self.diagnostic_text())
    }

    /// The full text used for signature matching and debug logs, including
    /// any response body the `Display` form leaves out.
    pub fn diagnostic_text(&self) -> String {
        match self {
            Pdf2MdError::Http { body, .. } => format!("{self}: {body}"),
            Pdf2MdError::VisionUnsupported { detail, .. } => format!("{self}: {detail}"),
            other => other.to_string(),
        }
    }
}
