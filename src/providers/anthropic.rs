//! Cloud vision adapter for the Anthropic Messages API.
//!
//! All pages go out in one request: prompt, then each image with a page
//! separator between consecutive images.
//!
//! ## Why substitute unknown models?
//!
//! The model picker offers a fixed list. A stale or mistyped model name in the
//! settings file falls back to the first listed model instead of failing the
//! run; the substitution is logged at `warn` so it does not go unnoticed.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{base_url_or, expect_success, Provider};
use crate::config::{ProviderId, Settings, ANTHROPIC_MODELS};
use crate::error::Pdf2MdError;
use crate::http::{HttpClient, HttpRequest};
use crate::message::{build_user_message, to_anthropic_content};
use crate::progress::RunContext;
use crate::prompts::with_input;

/// Output cap per call.
pub const MAX_TOKENS: u32 = 4096;
pub const API_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const NAME: &str = "Anthropic";

pub struct AnthropicProvider {
    http: Arc<dyn HttpClient>,
}

impl AnthropicProvider {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }

    /// The configured model when allow-listed, else the first allow-listed one.
    pub fn resolve_model(configured: &str) -> &'static str {
        match ANTHROPIC_MODELS.iter().find(|m| **m == configured) {
            Some(m) => m,
            None => {
                let fallback = ANTHROPIC_MODELS[0];
                warn!(
                    "Model '{}' is not a supported Anthropic model; using '{}' instead",
                    configured, fallback
                );
                fallback
            }
        }
    }

    fn api_key(settings: &Settings) -> Result<&str, Pdf2MdError> {
        let key = settings.anthropic_api_key.trim();
        if key.is_empty() {
            return Err(Pdf2MdError::ProviderNotConfigured {
                provider: NAME.into(),
                hint: "set an Anthropic API key".into(),
            });
        }
        Ok(key)
    }

    async fn send(&self, ctx: &RunContext, settings: &Settings, key: &str, body: Value) -> Result<String, Pdf2MdError> {
        ctx.check_cancelled()?;
        let url = format!(
            "{}/v1/messages",
            base_url_or(&settings.anthropic_base_url, DEFAULT_BASE_URL)
        );
        let request = HttpRequest::post_json(url, &body)
            .header("x-api-key", key)
            .header("anthropic-version", API_VERSION);

        let response = expect_success(NAME, self.http.send(request).await?)
            .inspect_err(|e| debug!("Anthropic request failed: {}", e.diagnostic_text()))?;
        extract_text(&response.json::<Value>(NAME)?)
    }
}

/// Text of the first `text` block in `content`.
fn extract_text(body: &Value) -> Result<String, Pdf2MdError> {
    body.get("content")
        .and_then(Value::as_array)
        .and_then(|blocks| {
            blocks
                .iter()
                .find(|b| b.get("type").and_then(Value::as_str) == Some("text"))
        })
        .and_then(|b| b.get("text"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Pdf2MdError::MalformedResponse {
            provider: NAME.into(),
            detail: "no text block in content".into(),
        })
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    async fn process_images(
        &self,
        ctx: &RunContext,
        settings: &Settings,
        images: &[String],
        prompt: &str,
    ) -> Result<String, Pdf2MdError> {
        if images.is_empty() {
            return Err(Pdf2MdError::EmptyInput {
                provider: NAME.into(),
            });
        }
        let key = Self::api_key(settings)?;
        let model = Self::resolve_model(&settings.selected_model);

        let message = build_user_message(prompt, images, true);
        let body = json!({
            "model": model,
            "max_tokens": MAX_TOKENS,
            "messages": [{ "role": "user", "content": to_anthropic_content(&message) }],
        });

        debug!(model, pages = images.len(), "Sending pages to Anthropic");
        self.send(ctx, settings, key, body).await
    }

    async fn process_text(
        &self,
        ctx: &RunContext,
        settings: &Settings,
        text: &str,
        prompt: &str,
    ) -> Result<String, Pdf2MdError> {
        let key = Self::api_key(settings)?;
        let model = Self::resolve_model(&settings.selected_model);
        let body = json!({
            "model": model,
            "max_tokens": MAX_TOKENS,
            "messages": [{ "role": "user", "content": with_input(prompt, text) }],
        });
        self.send(ctx, settings, key, body).await
    }
}
