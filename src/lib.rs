//! # pdf2md-notes
//!
//! Turn PDFs and page images into Markdown notes with a vision-capable AI
//! model: a cloud API, an OpenAI-compatible endpoint, or a local inference
//! server.
//!
//! ## Why rasterise?
//!
//! Text extraction from PDFs falls apart on scans, handwriting, multi-column
//! layouts and formulas. Rendering each page to an image and letting a
//! vision model read it the way a person would gives usable Markdown for all
//! of them, at the cost of one model call per page or chunk of pages.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / images (in a DocumentStore)
//!  │
//!  ├─ 1. Extract   pdftoppm → PNG data URLs (or read image files)
//!  ├─ 2. AI        selected Provider: one request, or chunked + retried
//!  ├─ 3. Refine    optional pass 2 / pass 3 text-only rewrites
//!  ├─ 4. Template  {{content}} / {{date}} front matter, optional embed
//!  ├─ 5. Write     named note, collision handling, confirmation
//!  └─ 6. Move      processed source into its archive folder
//! ```
//!
//! Progress events and cancellation flow through a caller-owned
//! [`RunContext`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pdf2md_notes::{Converter, LocalStore, PdftoppmRasterizer, ProviderId, ProviderRegistry, RunContext, Settings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::builder()
//!         .provider(ProviderId::Ollama)
//!         .model("llava:13b")
//!         .build()?;
//!     let converter = Converter::new(
//!         Arc::new(ProviderRegistry::with_defaults()?),
//!         Arc::new(PdftoppmRasterizer),
//!         Arc::new(LocalStore::new("/path/to/vault")),
//!     );
//!     let output = converter
//!         .process_pdf(&RunContext::new(), &settings, "Inbox/scan.pdf")
//!         .await?;
//!     println!("wrote {}", output.output_path);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2md` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! ## External tools
//!
//! | Tool | Used for | Needed when |
//! |------|----------|-------------|
//! | `pdftoppm` (poppler) | PDF page rasterisation | converting PDFs |
//! | `tesseract` | OCR text fallback | a local model rejects images and the fallback is on |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod diagnostics;
pub mod error;
pub mod http;
pub mod message;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod providers;
pub mod tools;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ProviderId, Settings, SettingsBuilder};
pub use convert::{generate_markdown, ConfirmOverwrite, Converter, FixedDecision, OverwriteDecision};
pub use diagnostics::{run_diagnostics, DiagnosticsResult};
pub use error::Pdf2MdError;
pub use http::{HttpClient, HttpRequest, HttpResponse, ReqwestClient};
pub use message::{build_data_url, build_user_message, split_data_url, ContentPart, Message, Role};
pub use output::{ChunkResult, ConversionOutput, ConversionStats, WriteOutcome};
pub use pipeline::store::{DocumentStore, LocalStore};
pub use progress::{CancelFlag, NoopProgressSink, ProgressEvent, ProgressPhase, ProgressSink, RunContext};
pub use providers::{ConnectionProbe, ModelLister, Provider, ProviderRegistry, RoundTripProbe};
pub use tools::{OcrExtractor, PageRasterizer, PdftoppmRasterizer, TesseractOcr};
