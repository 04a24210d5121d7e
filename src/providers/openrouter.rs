//! Placeholder for the OpenRouter backend.
//!
//! The id is part of the settings schema so stored settings that select it
//! keep loading. Every call fails with [`Pdf2MdError::ProviderNotImplemented`].

use async_trait::async_trait;

use super::{ConnectionProbe, Provider};
use crate::config::{ProviderId, Settings};
use crate::error::Pdf2MdError;
use crate::progress::RunContext;

#[derive(Debug, Default)]
pub struct OpenRouterProvider;

fn not_implemented() -> Pdf2MdError {
    Pdf2MdError::ProviderNotImplemented {
        provider: ProviderId::OpenRouter.display_name().into(),
    }
}

#[async_trait]
impl Provider for OpenRouterProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenRouter
    }

    async fn process_images(
        &self,
        _ctx: &RunContext,
        _settings: &Settings,
        _images: &[String],
        _prompt: &str,
    ) -> Result<String, Pdf2MdError> {
        Err(not_implemented())
    }

    async fn process_text(
        &self,
        _ctx: &RunContext,
        _settings: &Settings,
        _text: &str,
        _prompt: &str,
    ) -> Result<String, Pdf2MdError> {
        Err(not_implemented())
    }

    fn as_connection_probe(&self) -> Option<&dyn ConnectionProbe> {
        Some(self)
    }
}

#[async_trait]
impl ConnectionProbe for OpenRouterProvider {
    async fn test_connection(&self, _settings: &Settings) -> bool {
        false
    }
}
