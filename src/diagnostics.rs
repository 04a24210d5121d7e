//! Environment health check.
//!
//! [`run_diagnostics`] probes the selected provider and both external tools
//! and always returns a report. Probe failures become entries in
//! [`DiagnosticsResult::messages`]; nothing here returns an error.

use serde::Serialize;
use tracing::{debug, info};

use crate::config::{ProviderId, Settings};
use crate::providers::ProviderRegistry;
use crate::tools::{OcrExtractor, PageRasterizer};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticsResult {
    pub provider: ProviderId,
    /// `true` for providers that cannot be probed.
    pub provider_connection_ok: bool,
    /// Local-inference provider only.
    pub models_count: Option<usize>,
    /// Local-inference provider only; `None` when the round trip errored.
    pub tiny_test_ok: Option<bool>,
    pub poppler_ok: bool,
    pub tesseract_ok: bool,
    pub messages: Vec<String>,
}

impl DiagnosticsResult {
    fn new(provider: ProviderId) -> Self {
        Self {
            provider,
            provider_connection_ok: false,
            models_count: None,
            tiny_test_ok: None,
            poppler_ok: false,
            tesseract_ok: false,
            messages: Vec::new(),
        }
    }

    /// Everything probed came back healthy.
    pub fn all_ok(&self) -> bool {
        self.provider_connection_ok
            && self.tiny_test_ok != Some(false)
            && self.poppler_ok
            && self.tesseract_ok
            && self.messages.is_empty()
    }
}

/// Probe the selected provider, then `pdftoppm` and `tesseract`.
///
/// For the local-inference provider the model list in `settings` is
/// refreshed and a one-shot generation is attempted.
pub async fn run_diagnostics(
    registry: &ProviderRegistry,
    rasterizer: &dyn PageRasterizer,
    ocr: &dyn OcrExtractor,
    settings: &mut Settings,
) -> DiagnosticsResult {
    let id = settings.selected_provider;
    let mut result = DiagnosticsResult::new(id);

    match registry.get(id) {
        Ok(provider) => {
            result.provider_connection_ok = match provider.as_connection_probe() {
                Some(probe) => probe.test_connection(settings).await,
                None => true,
            };
            if !result.provider_connection_ok {
                result
                    .messages
                    .push(format!("Could not connect to {}", id.display_name()));
            }

            if id == ProviderId::Ollama {
                if let Some(lister) = provider.as_model_lister() {
                    lister.load_models(settings).await;
                }
                result.models_count = Some(settings.ollama_models.len());

                if let Some(probe) = provider.as_round_trip_probe() {
                    match probe.tiny_test(settings).await {
                        Ok(ok) => {
                            result.tiny_test_ok = Some(ok);
                            if !ok {
                                result.messages.push("Tiny Ollama test did not return OK".into());
                            }
                        }
                        Err(e) => result.messages.push(format!("Tiny Ollama test error: {e}")),
                    }
                }
            }
        }
        Err(e) => result.messages.push(format!("Diagnostics error: {e}")),
    }

    result.poppler_ok = rasterizer.is_available(settings).await;
    if !result.poppler_ok {
        result.messages.push("Poppler (pdftoppm) not found".into());
    }
    result.tesseract_ok = ocr.is_available(settings).await;
    if !result.tesseract_ok {
        result.messages.push("Tesseract not found".into());
    }

    debug!("Diagnostics: {:?}", result);
    info!(
        "Diagnostics for {}: connection={}, poppler={}, tesseract={}",
        id.display_name(),
        result.provider_connection_ok,
        result.poppler_ok,
        result.tesseract_ok
    );
    result
}
