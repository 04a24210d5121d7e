//! Conversion entry points.
//!
//! A [`Converter`] drives one document through the run state machine:
//!
//! ```text
//! Idle ─▶ ExtractingPages ─▶ AIProcessing ─▶ [Refinement pass 2 ─▶ [pass 3]]
//!      ─▶ PostProcessing ─▶ WritingOutput ─▶ Done
//! ```
//!
//! Every state can fail. Extraction, AI processing and the output write are
//! terminal. Refinement and post-processing degrade gracefully: on failure
//! the text from before that stage is kept.
//!
//! ## Why is the context passed in?
//!
//! Progress reporting and cancellation live on the caller-owned
//! [`RunContext`], so two runs with different contexts never observe each
//! other's cancel flag or progress sink.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Local;
use tracing::{debug, info, warn};

use crate::config::{ProviderId, Settings};
use crate::error::Pdf2MdError;
use crate::output::{ConversionOutput, ConversionStats, WriteOutcome};
use crate::pipeline::{input, postprocess, store::DocumentStore};
use crate::progress::RunContext;
use crate::providers::{Provider, ProviderRegistry};
use crate::tools::PageRasterizer;

// ── Existing-output confirmation ─────────────────────────────────────────

/// Answer to "the note already exists, what now?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwriteDecision {
    /// Replace the existing note.
    Overwrite,
    /// Write next to it under the first free `" N"` suffix.
    KeepBoth,
    /// Leave the existing note alone and write nothing.
    Skip,
}

/// Asked once per run when the output note already exists.
#[async_trait]
pub trait ConfirmOverwrite: Send + Sync {
    async fn confirm(&self, output_path: &str) -> OverwriteDecision;
}

/// Always gives the same answer.
#[derive(Debug, Clone, Copy)]
pub struct FixedDecision(pub OverwriteDecision);

#[async_trait]
impl ConfirmOverwrite for FixedDecision {
    async fn confirm(&self, _output_path: &str) -> OverwriteDecision {
        self.0
    }
}

// ── Converter ────────────────────────────────────────────────────────────

/// Orchestrates conversions against one store.
pub struct Converter {
    registry: Arc<ProviderRegistry>,
    rasterizer: Arc<dyn PageRasterizer>,
    store: Arc<dyn DocumentStore>,
    confirm: Arc<dyn ConfirmOverwrite>,
}

impl Converter {
    /// Existing notes are kept and the new one gets a numbered name unless
    /// [`Converter::with_confirm`] says otherwise.
    pub fn new(
        registry: Arc<ProviderRegistry>,
        rasterizer: Arc<dyn PageRasterizer>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            registry,
            rasterizer,
            store,
            confirm: Arc::new(FixedDecision(OverwriteDecision::KeepBoth)),
        }
    }

    pub fn with_confirm(mut self, confirm: Arc<dyn ConfirmOverwrite>) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Convert a PDF in the store into a Markdown note.
    pub async fn process_pdf(
        &self,
        ctx: &RunContext,
        settings: &Settings,
        pdf_path: &str,
    ) -> Result<ConversionOutput, Pdf2MdError> {
        info!("Starting conversion: {}", pdf_path);
        check_credentials(settings)?;

        ctx.status("Extracting page images");
        let bytes = input::load_pdf(self.store.as_ref(), pdf_path).await?;
        let images = self
            .rasterizer
            .rasterize(&bytes, settings)
            .await
            .map_err(extraction_failure)?;
        if images.is_empty() {
            return Err(Pdf2MdError::ExtractionFailed {
                detail: "no page images were produced".into(),
            });
        }
        info!("Extracted {} page images from '{}'", images.len(), pdf_path);

        self.process_images_with_ai(ctx, settings, &images, pdf_path).await
    }

    /// Convert a set of image files, in the given order, into one note named
    /// after the first file.
    pub async fn process_image_files(
        &self,
        ctx: &RunContext,
        settings: &Settings,
        image_paths: &[String],
    ) -> Result<ConversionOutput, Pdf2MdError> {
        let Some(first) = image_paths.first() else {
            return Err(Pdf2MdError::EmptyInput {
                provider: settings.selected_provider.display_name().into(),
            });
        };
        check_credentials(settings)?;

        ctx.status("Reading image files");
        let images = input::load_images(self.store.as_ref(), image_paths, settings.pdf_image_max_width).await?;
        info!("Converted {} image files", images.len());

        self.process_images_with_ai(ctx, settings, &images, first).await
    }

    /// Everything after extraction: AI processing, refinement,
    /// post-processing, writing and moving the source.
    pub async fn process_images_with_ai(
        &self,
        ctx: &RunContext,
        settings: &Settings,
        images: &[String],
        source_path: &str,
    ) -> Result<ConversionOutput, Pdf2MdError> {
        let start = Instant::now();
        let provider = self.registry.get(settings.selected_provider)?;

        let result = generate_markdown(ctx, provider.as_ref(), settings, images, &settings.current_prompt).await;
        let (mut markdown, passes) = match result {
            Ok(done) => done,
            Err(e) if e.is_cancelled() => {
                info!("Conversion of '{}' cancelled", source_path);
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let now = Local::now();
        let mut template_applied = false;
        if settings.enable_post_processing {
            ctx.status("Post-processing markdown");
            match postprocess::apply_template(&settings.post_processing_template, &markdown, now) {
                Ok(templated) => {
                    markdown = templated;
                    template_applied = true;
                }
                Err(e) => warn!("Post-processing failed, keeping the raw markdown: {}", e),
            }
        }
        if settings.embed_pdf {
            markdown = postprocess::append_embed(&markdown, source_path);
        }

        ctx.status("Writing output file");
        let target = postprocess::output_path(settings, source_path, now);
        let (output_path, write) = self.write_note(&target, &markdown).await?;

        let moved_to = if settings.move_processed_pdfs && !settings.processed_pdf_folder.trim().is_empty() {
            self.move_processed(&settings.processed_pdf_folder, source_path).await
        } else {
            None
        };

        ctx.status("Done");
        let stats = ConversionStats {
            page_count: images.len(),
            refinement_passes_applied: passes,
            template_applied,
            processing_time_ms: millis(start.elapsed()),
        };
        info!(
            "Wrote '{}' ({:?}) in {}ms",
            output_path, write, stats.processing_time_ms
        );
        Ok(ConversionOutput {
            markdown,
            output_path,
            write,
            moved_to,
            stats,
        })
    }

    async fn write_note(&self, target: &str, markdown: &str) -> Result<(String, WriteOutcome), Pdf2MdError> {
        if !self.store.exists(target).await {
            self.store.write_text(target, markdown).await?;
            return Ok((target.to_string(), WriteOutcome::Created));
        }

        match self.confirm.confirm(target).await {
            OverwriteDecision::Overwrite => {
                self.store.write_text(target, markdown).await?;
                Ok((target.to_string(), WriteOutcome::Overwritten))
            }
            OverwriteDecision::KeepBoth => {
                let free = postprocess::find_free_path(self.store.as_ref(), target).await;
                debug!("'{}' exists, writing '{}'", target, free);
                self.store.write_text(&free, markdown).await?;
                Ok((free, WriteOutcome::Created))
            }
            OverwriteDecision::Skip => {
                info!("Keeping existing '{}'", target);
                Ok((target.to_string(), WriteOutcome::Skipped))
            }
        }
    }

    /// Best effort: failures are logged and reported as `None`.
    async fn move_processed(&self, folder: &str, source_path: &str) -> Option<String> {
        let result = async {
            if !self.store.exists(folder).await {
                self.store.create_folder(folder).await?;
                debug!("Created folder '{}'", folder);
            }
            let dest = postprocess::processed_destination(folder, source_path);
            let dest = postprocess::find_free_path(self.store.as_ref(), &dest).await;
            self.store.rename(source_path, &dest).await?;
            Ok::<_, Pdf2MdError>(dest)
        }
        .await;

        match result {
            Ok(dest) => {
                info!("Moved '{}' to '{}'", source_path, dest);
                Some(dest)
            }
            Err(e) => {
                warn!("Failed to move '{}' to '{}': {}", source_path, folder, e);
                None
            }
        }
    }
}

// ── Stages ───────────────────────────────────────────────────────────────

/// AI processing plus the optional refinement passes.
///
/// Returns the Markdown and the number of refinement passes whose output
/// replaced the current text. Refinement errors other than cancellation
/// are logged and the pre-refinement text is kept; a failed pass 2 also
/// skips pass 3.
pub async fn generate_markdown(
    ctx: &RunContext,
    provider: &dyn Provider,
    settings: &Settings,
    images: &[String],
    prompt: &str,
) -> Result<(String, usize), Pdf2MdError> {
    if images.is_empty() {
        return Err(Pdf2MdError::EmptyInput {
            provider: provider.id().display_name().into(),
        });
    }

    ctx.status("Sending images to AI provider");
    let initial = provider.process_images(ctx, settings, images, prompt).await?;
    if initial.trim().is_empty() {
        return Err(Pdf2MdError::MalformedResponse {
            provider: provider.id().display_name().into(),
            detail: "the provider returned no text".into(),
        });
    }
    debug!("Initial markdown: {} chars", initial.len());

    let mut current = initial;
    let mut applied = 0;
    if !settings.enable_multi_pass {
        return Ok((current, applied));
    }

    let passes = [
        (2, settings.pass2_prompt.as_str(), crate::prompts::PASS2_PROMPT, true),
        (3, settings.pass3_prompt.as_str(), crate::prompts::PASS3_PROMPT, settings.enable_third_pass),
    ];
    for (pass, configured, default, enabled) in passes {
        if !enabled {
            break;
        }
        let pass_prompt = if configured.trim().is_empty() { default } else { configured };
        ctx.status(format!("Refinement pass {pass}"));
        match provider.process_text(ctx, settings, &current, pass_prompt).await {
            Ok(refined) if !refined.trim().is_empty() => {
                current = refined;
                applied += 1;
            }
            Ok(_) => debug!("Refinement pass {} returned nothing; keeping current text", pass),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!("Refinement pass {} failed; continuing with current markdown: {}", pass, e);
                break;
            }
        }
    }
    Ok((current, applied))
}

/// Fail before any work when the selected cloud provider has no key.
fn check_credentials(settings: &Settings) -> Result<(), Pdf2MdError> {
    let missing = match settings.selected_provider {
        ProviderId::Anthropic => settings.anthropic_api_key.trim().is_empty(),
        ProviderId::OpenAi => settings.openai_api_key.trim().is_empty(),
        _ => false,
    };
    if missing {
        return Err(Pdf2MdError::ProviderNotConfigured {
            provider: settings.selected_provider.display_name().into(),
            hint: "please set an API key".into(),
        });
    }
    Ok(())
}

fn extraction_failure(e: Pdf2MdError) -> Pdf2MdError {
    match e {
        Pdf2MdError::ExtractionFailed { .. } | Pdf2MdError::ToolNotFound { .. } => e,
        other => Pdf2MdError::ExtractionFailed {
            detail: other.to_string(),
        },
    }
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
