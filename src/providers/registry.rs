//! Fixed id → adapter mapping, built once at start-up.

use std::collections::HashMap;
use std::sync::Arc;

use super::{AnthropicProvider, OllamaProvider, OpenAiCompatProvider, OpenRouterProvider, Provider};
use crate::config::ProviderId;
use crate::error::Pdf2MdError;
use crate::http::{HttpClient, ReqwestClient};
use crate::tools::{OcrExtractor, TesseractOcr};

pub struct ProviderRegistry {
    providers: HashMap<ProviderId, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Every built-in adapter sharing one HTTP client and OCR tool.
    pub fn new(http: Arc<dyn HttpClient>, ocr: Arc<dyn OcrExtractor>) -> Self {
        let providers: Vec<Arc<dyn Provider>> = vec![
            Arc::new(AnthropicProvider::new(http.clone())),
            Arc::new(OllamaProvider::new(http.clone(), ocr)),
            Arc::new(OpenAiCompatProvider::cloud(http.clone())),
            Arc::new(OpenAiCompatProvider::lm_studio(http)),
            Arc::new(OpenRouterProvider),
        ];
        Self::from_providers(providers)
    }

    /// Registry over `reqwest` and `tesseract`.
    pub fn with_defaults() -> Result<Self, Pdf2MdError> {
        Ok(Self::new(Arc::new(ReqwestClient::new()?), Arc::new(TesseractOcr::new())))
    }

    /// Registry over caller-supplied adapters. A later adapter with the same
    /// id replaces an earlier one.
    pub fn from_providers(providers: impl IntoIterator<Item = Arc<dyn Provider>>) -> Self {
        Self {
            providers: providers.into_iter().map(|p| (p.id(), p)).collect(),
        }
    }

    /// Adapter for `id`.
    ///
    /// Ids outside the registered set are a configuration bug, reported as
    /// [`Pdf2MdError::ProviderNotImplemented`].
    pub fn get(&self, id: ProviderId) -> Result<Arc<dyn Provider>, Pdf2MdError> {
        self.providers
            .get(&id)
            .cloned()
            .ok_or_else(|| Pdf2MdError::ProviderNotImplemented {
                provider: id.display_name().into(),
            })
    }

    pub fn ids(&self) -> Vec<ProviderId> {
        ProviderId::ALL
            .into_iter()
            .filter(|id| self.providers.contains_key(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::ScriptedClient;

    #[test]
    fn every_id_is_registered() {
        let registry = ProviderRegistry::new(
            Arc::new(ScriptedClient::fixed(200, "{}")),
            Arc::new(TesseractOcr::new()),
        );
        for id in ProviderId::ALL {
            assert_eq!(registry.get(id).unwrap().id(), id);
        }
        assert_eq!(registry.ids(), ProviderId::ALL.to_vec());
    }

    #[test]
    fn capabilities_per_adapter() {
        let registry = ProviderRegistry::new(
            Arc::new(ScriptedClient::fixed(200, "{}")),
            Arc::new(TesseractOcr::new()),
        );
        let anthropic = registry.get(ProviderId::Anthropic).unwrap();
        assert!(anthropic.as_model_lister().is_none());
        assert!(anthropic.as_connection_probe().is_none());
        let ollama = registry.get(ProviderId::Ollama).unwrap();
        assert!(ollama.as_model_lister().is_some());
        assert!(ollama.as_connection_probe().is_some());
    }

    #[test]
    fn partial_registry_reports_missing_ids() {
        let registry = ProviderRegistry::from_providers([Arc::new(OpenRouterProvider) as Arc<dyn Provider>]);
        assert!(registry.get(ProviderId::Ollama).is_err());
    }
}
