//! AI backend adapters.
//!
//! Every backend implements [`Provider`]: images-to-text and text-to-text.
//! Model listing and connectivity probing are optional capabilities exposed
//! through [`Provider::as_model_lister`] and [`Provider::as_connection_probe`];
//! callers ask for the capability instead of probing for methods.
//!
//! ```text
//! ProviderRegistry::get(id) ──▶ Arc<dyn Provider>
//!                                 ├── AnthropicProvider      one request, allow-listed models
//!                                 ├── OllamaProvider         chunked, retried, OCR fallback
//!                                 ├── OpenAiCompatProvider   cloud and LM Studio flavours
//!                                 └── OpenRouterProvider     not implemented
//! ```

pub mod anthropic;
pub mod heuristics;
pub mod ollama;
pub mod openai;
pub mod openrouter;
pub mod registry;
pub mod retry;

use async_trait::async_trait;

use crate::config::{ProviderId, Settings};
use crate::error::Pdf2MdError;
use crate::http::HttpResponse;
use crate::progress::RunContext;

pub use anthropic::AnthropicProvider;
pub use ollama::OllamaProvider;
pub use openai::{OpenAiCompatProvider, OpenAiFlavor};
pub use openrouter::OpenRouterProvider;
pub use registry::ProviderRegistry;
pub use retry::{with_retries, RetryPolicy};

/// The common AI-processing contract.
#[async_trait]
pub trait Provider: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Turn ordered page images (data URLs) into Markdown.
    async fn process_images(
        &self,
        ctx: &RunContext,
        settings: &Settings,
        images: &[String],
        prompt: &str,
    ) -> Result<String, Pdf2MdError>;

    /// Text-only request: `prompt`, a blank line, then `text`.
    async fn process_text(
        &self,
        ctx: &RunContext,
        settings: &Settings,
        text: &str,
        prompt: &str,
    ) -> Result<String, Pdf2MdError>;

    fn as_model_lister(&self) -> Option<&dyn ModelLister> {
        None
    }

    fn as_connection_probe(&self) -> Option<&dyn ConnectionProbe> {
        None
    }

    fn as_round_trip_probe(&self) -> Option<&dyn RoundTripProbe> {
        None
    }
}

/// Refreshes the provider's model list inside `settings`.
#[async_trait]
pub trait ModelLister: Send + Sync {
    /// Returns whether the refresh succeeded. On failure the list is cleared.
    async fn load_models(&self, settings: &mut Settings) -> bool;
}

/// Best-effort reachability check. Never fails.
#[async_trait]
pub trait ConnectionProbe: Send + Sync {
    async fn test_connection(&self, settings: &Settings) -> bool;
}

/// One minimal generation against the configured model.
#[async_trait]
pub trait RoundTripProbe: Send + Sync {
    async fn tiny_test(&self, settings: &Settings) -> Result<bool, Pdf2MdError>;
}

// ── Shared adapter helpers ───────────────────────────────────────────────

/// Prefix `http://` when the scheme is missing and drop a trailing slash.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    let url = if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("http://{url}")
    };
    url.trim_end_matches('/').to_string()
}

/// Base URL with trailing slashes removed, or `default` when empty.
pub fn base_url_or(url: &str, default: &str) -> String {
    let url = url.trim();
    let url = if url.is_empty() { default } else { url };
    url.trim_end_matches('/').to_string()
}

/// Non-2xx responses become [`Pdf2MdError::Http`] with the body attached.
pub fn expect_success(provider: &str, response: HttpResponse) -> Result<HttpResponse, Pdf2MdError> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(Pdf2MdError::Http {
            provider: provider.to_string(),
            status: response.status,
            body: response.body,
        })
    }
}

/// Pre-flight check shared by the adapters that need an explicit model.
pub fn require_model<'a>(provider: ProviderId, settings: &'a Settings) -> Result<&'a str, Pdf2MdError> {
    let model = settings.selected_model.trim();
    if model.is_empty() {
        Err(Pdf2MdError::ProviderNotConfigured {
            provider: provider.display_name().to_string(),
            hint: "please set a model name".into(),
        })
    } else {
        Ok(model)
    }
}
