//! CLI binary for pdf2md-notes.
//!
//! A thin shim over the library crate: maps flags onto `Settings`, wires a
//! progress bar into the run context and prints results.

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf2md_notes::pipeline::input::{is_image_path, is_pdf_path};
use pdf2md_notes::{
    run_diagnostics, Converter, FixedDecision, LocalStore, OverwriteDecision, PdftoppmRasterizer,
    ProgressEvent, ProgressPhase, ProgressSink, ProviderId, ProviderRegistry, RunContext, Settings,
    TesseractOcr, WriteOutcome,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── Progress bar fed from progress events ────────────────────────────────────

/// Spinner for status events; switches to a bar once chunk events arrive.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} chunks  ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Converting");
    }
}

impl ProgressSink for CliProgress {
    fn on_event(&self, event: &ProgressEvent) {
        match (event.phase, event.current, event.total) {
            (ProgressPhase::Chunk, Some(current), Some(total)) => {
                if self.bar.length() != Some(total as u64) {
                    self.activate_bar(total);
                }
                self.bar.set_position(current.saturating_sub(1) as u64);
                self.bar.set_message(event.message.clone());
            }
            _ => {
                if event.message == "Done" {
                    self.bar.finish_and_clear();
                } else {
                    self.bar.set_message(event.message.clone());
                }
            }
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a PDF in the current vault with a local model
  pdf2md --provider ollama --model llava:13b Inbox/scan.pdf

  # Several photographed pages into one note (named after the first image)
  pdf2md --provider anthropic page1.jpg page2.jpg page3.jpg

  # Refinement passes, notes written to a folder, source archived
  pdf2md --multi-pass --third-pass --output-folder Notes --move-to "Processed PDFs" Inbox/paper.pdf

  # Check the environment
  pdf2md --provider ollama --model llava:7b --diagnose

  # Refresh and print the model list of the selected provider
  pdf2md --provider lmstudio --list-models

PROVIDERS:
  anthropic    Cloud vision API (allow-listed models, one request)
  ollama       Local inference server (chunked, retried, OCR fallback)
  openai       OpenAI-compatible cloud chat API
  lmstudio     LM Studio local server (OpenAI-compatible)
  openrouter   Reserved, not implemented

ENVIRONMENT VARIABLES:
  ANTHROPIC_API_KEY   Anthropic API key
  OPENAI_API_KEY      OpenAI API key
  PDF2MD_SETTINGS     Settings JSON file (partial files overlay defaults)
  RUST_LOG            Log filter, overrides --verbose/--quiet

EXTERNAL TOOLS:
  pdftoppm (poppler)  needed for PDFs     brew install poppler / apt-get install poppler-utils
  tesseract           OCR text fallback   brew install tesseract / apt-get install tesseract-ocr
"#;

/// Convert PDFs and page images to Markdown notes with vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2md",
    version,
    about = "Convert PDFs and page images to Markdown notes with vision LLMs",
    long_about = "Convert PDFs and page images stored in a notes vault into Markdown notes. \
Pages are rasterised with pdftoppm and read by a vision model: Anthropic, an OpenAI-compatible \
API, LM Studio, or a local Ollama server.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// One PDF, or one or more image files, relative to the vault.
    #[arg(required_unless_present_any = ["diagnose", "list_models"])]
    inputs: Vec<String>,

    /// Vault root; inputs and outputs are relative to it.
    #[arg(long, env = "PDF2MD_VAULT", default_value = ".")]
    vault: PathBuf,

    /// Settings JSON file; flags override its values.
    #[arg(long, env = "PDF2MD_SETTINGS")]
    settings: Option<PathBuf>,

    /// Write the effective settings (including refreshed model lists) here.
    #[arg(long)]
    save_settings: Option<PathBuf>,

    /// anthropic, ollama, openai, lmstudio or openrouter.
    #[arg(long, env = "PDF2MD_PROVIDER")]
    provider: Option<ProviderId>,

    /// Model name for the selected provider.
    #[arg(long, env = "PDF2MD_MODEL")]
    model: Option<String>,

    /// Text file with the extraction prompt.
    #[arg(long)]
    prompt_file: Option<PathBuf>,

    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    anthropic_api_key: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    #[arg(long, env = "PDF2MD_OPENAI_BASE_URL")]
    openai_base_url: Option<String>,

    #[arg(long, env = "OLLAMA_HOST")]
    ollama_url: Option<String>,

    #[arg(long, env = "PDF2MD_LMSTUDIO_URL")]
    lmstudio_url: Option<String>,

    /// Images per local-inference request.
    #[arg(long)]
    images_per_request: Option<usize>,

    /// Retries per chunk on transient failures.
    #[arg(long)]
    retries: Option<u32>,

    /// Fixed delay between retries, in milliseconds.
    #[arg(long)]
    retry_delay_ms: Option<u64>,

    /// Request NDJSON streaming responses from the local server.
    #[arg(long)]
    streaming: bool,

    /// Treat the local model as vision-capable regardless of its name.
    #[arg(long)]
    assume_vision: bool,

    /// OCR the pages with tesseract when the local model rejects images.
    #[arg(long)]
    text_fallback: bool,

    /// Run refinement pass 2.
    #[arg(long)]
    multi_pass: bool,

    /// Run refinement pass 3 as well (implies --multi-pass).
    #[arg(long)]
    third_pass: bool,

    /// Skip the post-processing template.
    #[arg(long)]
    no_post_processing: bool,

    /// Append an embed of the source file to the note.
    #[arg(long)]
    embed: bool,

    /// Folder for the notes; default is next to the source.
    #[arg(long)]
    output_folder: Option<String>,

    /// File-name pattern with {{basename}} and {{date}}.
    #[arg(long)]
    filename_pattern: Option<String>,

    /// Move the processed source into this folder.
    #[arg(long)]
    move_to: Option<String>,

    /// Replace an existing note instead of writing a numbered copy.
    #[arg(long, conflicts_with = "skip_existing")]
    overwrite: bool,

    /// Leave an existing note untouched.
    #[arg(long)]
    skip_existing: bool,

    /// Rasterisation DPI (72–600).
    #[arg(long, value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: Option<u32>,

    /// Maximum page image width in pixels.
    #[arg(long)]
    max_width: Option<u32>,

    /// Probe the provider and external tools, then exit.
    #[arg(long)]
    diagnose: bool,

    /// Refresh and print the selected provider's models, then exit.
    #[arg(long)]
    list_models: bool,

    /// Print the result as JSON.
    #[arg(long)]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "PDF2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2MD_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.diagnose && !cli.list_models;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    let mut settings = build_settings(&cli).await?;
    let registry = ProviderRegistry::with_defaults().context("Failed to create HTTP client")?;

    // ── Diagnostics / model listing ──────────────────────────────────────
    if cli.diagnose {
        let report = run_diagnostics(&registry, &PdftoppmRasterizer, &TesseractOcr::new(), &mut settings).await;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&report).context("Failed to serialise report")?);
        } else {
            let mark = |ok: bool| if ok { green("✓") } else { red("✗") };
            println!("Provider:     {} {}", report.provider.display_name(), mark(report.provider_connection_ok));
            if let Some(n) = report.models_count {
                println!("Models:       {n}");
            }
            if let Some(ok) = report.tiny_test_ok {
                println!("Tiny test:    {}", mark(ok));
            }
            println!("pdftoppm:     {}", mark(report.poppler_ok));
            println!("tesseract:    {}", mark(report.tesseract_ok));
            for message in &report.messages {
                println!("  {} {}", dim("-"), message);
            }
        }
        save_if_requested(&cli, &settings)?;
        return Ok(());
    }

    if cli.list_models {
        let id = settings.selected_provider;
        let provider = registry.get(id)?;
        match provider.as_model_lister() {
            Some(lister) => {
                if !lister.load_models(&mut settings).await {
                    bail!("Could not load models from {}", id.display_name());
                }
            }
            None => info!("{} has a fixed model list", id.display_name()),
        }
        for model in settings.models_for(id) {
            println!("{model}");
        }
        save_if_requested(&cli, &settings)?;
        return Ok(());
    }

    // ── Conversion ───────────────────────────────────────────────────────
    let decision = if cli.overwrite {
        OverwriteDecision::Overwrite
    } else if cli.skip_existing {
        OverwriteDecision::Skip
    } else {
        OverwriteDecision::KeepBoth
    };
    let converter = Converter::new(
        Arc::new(registry),
        Arc::new(PdftoppmRasterizer),
        Arc::new(LocalStore::new(&cli.vault)),
    )
    .with_confirm(Arc::new(FixedDecision(decision)));

    let ctx = RunContext::new();
    if show_progress {
        ctx.set_reporter(CliProgress::new());
    }
    let cancel = ctx.cancel_flag().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling after the current request…");
            cancel.cancel();
        }
    });

    let result = if cli.inputs.len() == 1 && is_pdf_path(&cli.inputs[0]) {
        converter.process_pdf(&ctx, &settings, &cli.inputs[0]).await
    } else if cli.inputs.iter().all(|p| is_image_path(p)) {
        converter.process_image_files(&ctx, &settings, &cli.inputs).await
    } else {
        bail!("Pass either one PDF or one or more images (png, jpg, jpeg, webp)");
    };
    ctx.clear_reporter();

    let output = match result {
        Ok(output) => output,
        Err(e) if e.is_cancelled() => {
            eprintln!("{} {}", red("✘"), e);
            std::process::exit(130);
        }
        Err(e) => return Err(e).context("Conversion failed"),
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&output).context("Failed to serialise output")?);
    } else if !cli.quiet {
        let verb = match output.write {
            WriteOutcome::Created => "Created",
            WriteOutcome::Overwritten => "Overwrote",
            WriteOutcome::Skipped => "Kept existing",
        };
        eprintln!(
            "{}  {} {}  {}",
            green("✔"),
            verb,
            bold(&output.output_path),
            dim(&format!(
                "{} pages, {} refinement passes, {}ms",
                output.stats.page_count, output.stats.refinement_passes_applied, output.stats.processing_time_ms
            )),
        );
        if let Some(ref moved) = output.moved_to {
            eprintln!("   source moved to {}", bold(moved));
        }
    }

    save_if_requested(&cli, &settings)?;
    Ok(())
}

/// Settings file (or defaults) with CLI overrides applied.
async fn build_settings(cli: &Cli) -> Result<Settings> {
    let mut s = match cli.settings {
        Some(ref path) => Settings::load(path).context("Failed to load settings")?,
        None => Settings::default(),
    };

    if let Some(id) = cli.provider {
        s.selected_provider = id;
        if cli.model.is_none() && id != ProviderId::Anthropic {
            s.selected_model.clear();
        }
    }
    if let Some(ref model) = cli.model {
        s.selected_model = model.clone();
    }
    if let Some(ref path) = cli.prompt_file {
        s.current_prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path))?;
    }
    if let Some(ref key) = cli.anthropic_api_key {
        s.anthropic_api_key = key.clone();
    }
    if let Some(ref key) = cli.openai_api_key {
        s.openai_api_key = key.clone();
    }
    if let Some(ref url) = cli.openai_base_url {
        s.openai_base_url = url.clone();
    }
    if let Some(ref url) = cli.ollama_url {
        s.ollama_url = url.clone();
    }
    if let Some(ref url) = cli.lmstudio_url {
        s.lmstudio_base_url = url.clone();
    }
    if let Some(n) = cli.images_per_request {
        s.ollama_images_per_request = n.max(1);
    }
    if let Some(n) = cli.retries {
        s.ollama_retry_count = n;
    }
    if let Some(ms) = cli.retry_delay_ms {
        s.ollama_retry_delay_ms = ms;
    }
    s.ollama_enable_streaming |= cli.streaming;
    s.ollama_assume_vision |= cli.assume_vision;
    s.ollama_text_fallback |= cli.text_fallback;
    s.enable_multi_pass |= cli.multi_pass || cli.third_pass;
    s.enable_third_pass |= cli.third_pass;
    if cli.no_post_processing {
        s.enable_post_processing = false;
    }
    s.embed_pdf |= cli.embed;
    if let Some(ref folder) = cli.output_folder {
        s.output_folder = folder.clone();
    }
    if let Some(ref pattern) = cli.filename_pattern {
        s.filename_pattern = pattern.clone();
    }
    if let Some(ref folder) = cli.move_to {
        s.move_processed_pdfs = true;
        s.processed_pdf_folder = folder.clone();
    }
    if let Some(dpi) = cli.dpi {
        s.pdf_image_dpi = dpi;
    }
    if let Some(width) = cli.max_width {
        s.pdf_image_max_width = width;
    }

    s.validate().context("Invalid configuration")?;
    Ok(s)
}

fn save_if_requested(cli: &Cli, settings: &Settings) -> Result<()> {
    if let Some(ref path) = cli.save_settings {
        settings.save(path).context("Failed to save settings")?;
    }
    Ok(())
}
