//! Settings consumed by the conversion core.
//!
//! [`Settings`] is a flat record: the selected provider and model, per-provider
//! endpoints and credentials, per-provider tunables, and the feature flags of
//! the conversion pipeline. The host loads it once, mutates it from its UI and
//! persists it; the core reads a snapshot per call. The only fields the core
//! writes are the model lists, which adapters refresh as a side effect of
//! [`crate::providers::ModelLister::load_models`].
//!
//! Every field carries a default, and the struct deserialises with
//! `#[serde(default)]`, so a partially filled settings file overlays the
//! defaults rather than failing.

use crate::error::Pdf2MdError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Identifier of an AI backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// Cloud vision API (Anthropic Messages API).
    #[default]
    Anthropic,
    /// Local inference server (Ollama generate API).
    Ollama,
    /// OpenAI-compatible cloud chat API.
    OpenAi,
    /// Local GUI inference server exposing an OpenAI-compatible API (LM Studio).
    LmStudio,
    /// Placeholder backend; not implemented yet.
    OpenRouter,
}

impl ProviderId {
    pub const ALL: [ProviderId; 5] = [
        ProviderId::Anthropic,
        ProviderId::Ollama,
        ProviderId::OpenAi,
        ProviderId::LmStudio,
        ProviderId::OpenRouter,
    ];

    /// Human-readable backend name used in messages.
    pub fn display_name(self) -> &'static str {
        match self {
            ProviderId::Anthropic => "Anthropic",
            ProviderId::Ollama => "Ollama",
            ProviderId::OpenAi => "OpenAI",
            ProviderId::LmStudio => "LM Studio",
            ProviderId::OpenRouter => "OpenRouter",
        }
    }

    /// Settings-file key for this provider.
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderId::Anthropic => "anthropic",
            ProviderId::Ollama => "ollama",
            ProviderId::OpenAi => "openai",
            ProviderId::LmStudio => "lmstudio",
            ProviderId::OpenRouter => "openrouter",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl std::str::FromStr for ProviderId {
    type Err = Pdf2MdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderId::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Pdf2MdError::InvalidConfig(format!("unknown provider '{s}'")))
    }
}

/// The full settings record.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // ── Selection ────────────────────────────────────────────────────────
    pub selected_provider: ProviderId,
    pub selected_model: String,
    /// Prompt sent with the page images.
    pub current_prompt: String,

    // ── Cloud vision (Anthropic) ─────────────────────────────────────────
    pub anthropic_api_key: String,
    pub anthropic_base_url: String,
    pub anthropic_models: Vec<String>,

    // ── Local inference (Ollama) ─────────────────────────────────────────
    pub ollama_url: String,
    pub ollama_models: Vec<String>,
    pub ollama_vision_models: Vec<String>,
    /// Images grouped into one request. Many local vision models take one.
    pub ollama_images_per_request: usize,
    pub ollama_retry_count: u32,
    pub ollama_retry_delay_ms: u64,
    /// Skip the vision-capability warning for models the name heuristic misses.
    pub ollama_assume_vision: bool,
    /// Ask for a newline-delimited JSON response body.
    pub ollama_enable_streaming: bool,
    /// Character budget for one serialised generate request.
    pub ollama_max_request_chars: usize,
    /// Re-route a chunk through OCR when the model rejects images.
    pub ollama_text_fallback: bool,
    pub ollama_temperature: f32,
    pub ollama_num_predict: u32,

    // ── OpenAI-compatible cloud ──────────────────────────────────────────
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_organization: String,
    pub openai_temperature: f32,
    pub openai_max_tokens: u32,
    pub openai_models: Vec<String>,

    // ── OpenAI-compatible local GUI (LM Studio) ──────────────────────────
    pub lmstudio_base_url: String,
    pub lmstudio_api_key: String,
    pub lmstudio_temperature: f32,
    pub lmstudio_max_tokens: u32,
    pub lmstudio_models: Vec<String>,
    pub lmstudio_vision_models: Vec<String>,

    // ── Multi-pass refinement ────────────────────────────────────────────
    pub enable_multi_pass: bool,
    pub enable_third_pass: bool,
    pub pass2_prompt: String,
    pub pass3_prompt: String,

    // ── Post-processing and output ───────────────────────────────────────
    pub enable_post_processing: bool,
    pub post_processing_template: String,
    pub embed_pdf: bool,
    pub filename_pattern: String,
    /// Vault-relative folder for notes. Empty: next to the source file.
    pub output_folder: String,
    pub move_processed_pdfs: bool,
    pub processed_pdf_folder: String,

    // ── External tools ───────────────────────────────────────────────────
    /// Path to `pdftoppm`. Empty: look it up on `PATH`.
    pub poppler_pdftoppm_path: String,
    pub pdf_image_dpi: u32,
    pub pdf_image_max_width: u32,
    /// Path to `tesseract`. Empty: look it up on `PATH`.
    pub tesseract_path: String,
    pub ocr_language: String,
    pub ocr_engine_mode: u8,
    pub ocr_page_seg_mode: u8,
}

/// Cloud vision models the adapter accepts.
pub const ANTHROPIC_MODELS: &[&str] = &[
    "claude-sonnet-4-20250514",
    "claude-opus-4-20250514",
    "claude-3-5-sonnet-20241022",
    "claude-3-5-sonnet-20240620",
    "claude-3-5-haiku-20241022",
    "claude-3-opus-20240229",
    "claude-3-sonnet-20240229",
    "claude-3-haiku-20240307",
];

impl Default for Settings {
    fn default() -> Self {
        Self {
            selected_provider: ProviderId::Anthropic,
            selected_model: ANTHROPIC_MODELS[0].to_string(),
            current_prompt: crate::prompts::DEFAULT_EXTRACTION_PROMPT.to_string(),

            anthropic_api_key: String::new(),
            anthropic_base_url: "https://api.anthropic.com".to_string(),
            anthropic_models: ANTHROPIC_MODELS.iter().map(|m| m.to_string()).collect(),

            ollama_url: "http://localhost:11434".to_string(),
            ollama_models: Vec::new(),
            ollama_vision_models: Vec::new(),
            ollama_images_per_request: 1,
            ollama_retry_count: 2,
            ollama_retry_delay_ms: 1000,
            ollama_assume_vision: false,
            ollama_enable_streaming: false,
            ollama_max_request_chars: 900_000,
            ollama_text_fallback: false,
            ollama_temperature: 0.1,
            ollama_num_predict: 4096,

            openai_api_key: String::new(),
            openai_base_url: "https://api.openai.com".to_string(),
            openai_organization: String::new(),
            openai_temperature: 0.2,
            openai_max_tokens: 2048,
            openai_models: Vec::new(),

            lmstudio_base_url: "http://localhost:1234".to_string(),
            lmstudio_api_key: String::new(),
            lmstudio_temperature: 0.2,
            lmstudio_max_tokens: 2048,
            lmstudio_models: Vec::new(),
            lmstudio_vision_models: Vec::new(),

            enable_multi_pass: false,
            enable_third_pass: false,
            pass2_prompt: crate::prompts::PASS2_PROMPT.to_string(),
            pass3_prompt: crate::prompts::PASS3_PROMPT.to_string(),

            enable_post_processing: true,
            post_processing_template: crate::prompts::DEFAULT_TEMPLATE.to_string(),
            embed_pdf: false,
            filename_pattern: "{{basename}}".to_string(),
            output_folder: String::new(),
            move_processed_pdfs: false,
            processed_pdf_folder: "Processed PDFs".to_string(),

            poppler_pdftoppm_path: String::new(),
            pdf_image_dpi: 200,
            pdf_image_max_width: 2048,
            tesseract_path: String::new(),
            ocr_language: "eng".to_string(),
            ocr_engine_mode: 3,
            ocr_page_seg_mode: 3,
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |s: &str| if s.is_empty() { "<unset>" } else { "<redacted>" };
        f.debug_struct("Settings")
            .field("selected_provider", &self.selected_provider)
            .field("selected_model", &self.selected_model)
            .field("anthropic_api_key", &redact(&self.anthropic_api_key))
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("lmstudio_api_key", &redact(&self.lmstudio_api_key))
            .field("ollama_url", &self.ollama_url)
            .field("ollama_images_per_request", &self.ollama_images_per_request)
            .field("ollama_retry_count", &self.ollama_retry_count)
            .field("ollama_retry_delay_ms", &self.ollama_retry_delay_ms)
            .field("ollama_enable_streaming", &self.ollama_enable_streaming)
            .field("ollama_text_fallback", &self.ollama_text_fallback)
            .field("enable_multi_pass", &self.enable_multi_pass)
            .field("enable_third_pass", &self.enable_third_pass)
            .field("enable_post_processing", &self.enable_post_processing)
            .field("output_folder", &self.output_folder)
            .finish_non_exhaustive()
    }
}

impl Settings {
    /// Create a new builder starting from the defaults.
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder {
            settings: Self::default(),
        }
    }

    /// Load settings from a JSON file, overlaying the defaults. The result is
    /// checked with [`Settings::validate`].
    pub fn load(path: &Path) -> Result<Self, Pdf2MdError> {
        let invalid = |detail: String| Pdf2MdError::InvalidSettings {
            path: path.to_path_buf(),
            detail,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        let settings: Self = serde_json::from_str(&raw).map_err(|e| invalid(e.to_string()))?;
        settings.validate().map_err(|e| invalid(e.to_string()))?;
        Ok(settings)
    }

    /// Persist settings as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), Pdf2MdError> {
        let invalid = |detail: String| Pdf2MdError::InvalidSettings {
            path: path.to_path_buf(),
            detail,
        };
        let json = serde_json::to_string_pretty(self).map_err(|e| invalid(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| invalid(e.to_string()))
    }

    /// Check cross-field constraints. Settings loaded from disk or edited
    /// field by field go through this too.
    pub fn validate(&self) -> Result<(), Pdf2MdError> {
        if self.ollama_max_request_chars == 0 {
            return Err(Pdf2MdError::InvalidConfig(
                "max request chars must be ≥ 1".into(),
            ));
        }
        if self.enable_third_pass && !self.enable_multi_pass {
            return Err(Pdf2MdError::InvalidConfig(
                "the third refinement pass requires multi-pass to be enabled".into(),
            ));
        }
        if !(72..=600).contains(&self.pdf_image_dpi) {
            return Err(Pdf2MdError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                self.pdf_image_dpi
            )));
        }
        Ok(())
    }

    /// Images per local-inference request, never below one.
    pub fn images_per_request(&self) -> usize {
        self.ollama_images_per_request.max(1)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.ollama_retry_delay_ms)
    }

    /// Model list the given provider refreshes.
    pub fn models_for(&self, id: ProviderId) -> &[String] {
        match id {
            ProviderId::Anthropic => &self.anthropic_models,
            ProviderId::Ollama => &self.ollama_models,
            ProviderId::OpenAi => &self.openai_models,
            ProviderId::LmStudio => &self.lmstudio_models,
            ProviderId::OpenRouter => &[],
        }
    }
}

/// Builder for [`Settings`].
#[derive(Debug)]
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    pub fn provider(mut self, id: ProviderId) -> Self {
        self.settings.selected_provider = id;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.settings.selected_model = model.into();
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.settings.current_prompt = prompt.into();
        self
    }

    pub fn anthropic_api_key(mut self, key: impl Into<String>) -> Self {
        self.settings.anthropic_api_key = key.into();
        self
    }

    pub fn anthropic_base_url(mut self, url: impl Into<String>) -> Self {
        self.settings.anthropic_base_url = url.into();
        self
    }

    pub fn ollama_url(mut self, url: impl Into<String>) -> Self {
        self.settings.ollama_url = url.into();
        self
    }

    pub fn images_per_request(mut self, n: usize) -> Self {
        self.settings.ollama_images_per_request = n.max(1);
        self
    }

    pub fn retry_count(mut self, n: u32) -> Self {
        self.settings.ollama_retry_count = n;
        self
    }

    pub fn retry_delay_ms(mut self, ms: u64) -> Self {
        self.settings.ollama_retry_delay_ms = ms;
        self
    }

    pub fn assume_vision(mut self, v: bool) -> Self {
        self.settings.ollama_assume_vision = v;
        self
    }

    pub fn streaming(mut self, v: bool) -> Self {
        self.settings.ollama_enable_streaming = v;
        self
    }

    pub fn max_request_chars(mut self, n: usize) -> Self {
        self.settings.ollama_max_request_chars = n;
        self
    }

    pub fn text_fallback(mut self, v: bool) -> Self {
        self.settings.ollama_text_fallback = v;
        self
    }

    pub fn openai_api_key(mut self, key: impl Into<String>) -> Self {
        self.settings.openai_api_key = key.into();
        self
    }

    pub fn openai_base_url(mut self, url: impl Into<String>) -> Self {
        self.settings.openai_base_url = url.into();
        self
    }

    pub fn lmstudio_base_url(mut self, url: impl Into<String>) -> Self {
        self.settings.lmstudio_base_url = url.into();
        self
    }

    pub fn multi_pass(mut self, pass2: bool, pass3: bool) -> Self {
        self.settings.enable_multi_pass = pass2;
        self.settings.enable_third_pass = pass3;
        self
    }

    pub fn post_processing(mut self, enabled: bool, template: impl Into<String>) -> Self {
        self.settings.enable_post_processing = enabled;
        self.settings.post_processing_template = template.into();
        self
    }

    pub fn output_folder(mut self, folder: impl Into<String>) -> Self {
        self.settings.output_folder = folder.into();
        self
    }

    pub fn move_processed(mut self, folder: impl Into<String>) -> Self {
        self.settings.move_processed_pdfs = true;
        self.settings.processed_pdf_folder = folder.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        let t = t.clamp(0.0, 2.0);
        self.settings.ollama_temperature = t;
        self.settings.openai_temperature = t;
        self.settings.lmstudio_temperature = t;
        self
    }

    /// Build the settings, validating constraints.
    pub fn build(self) -> Result<Settings, Pdf2MdError> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}
