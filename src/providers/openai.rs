//! OpenAI-compatible chat completions, for the cloud API and for LM Studio.
//!
//! Both flavours send one non-streaming request holding every page. Images go
//! out as full data URLs inside `image_url` parts, unlike the Anthropic
//! adapter which sends bare base64.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::heuristics::is_vision_model_loose;
use super::{base_url_or, expect_success, require_model, ConnectionProbe, ModelLister, Provider};
use crate::config::{ProviderId, Settings};
use crate::error::Pdf2MdError;
use crate::http::{HttpClient, HttpRequest};
use crate::message::{build_user_message, to_openai_message, Message};
use crate::progress::RunContext;
use crate::prompts::with_input;

/// Which server the adapter talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAiFlavor {
    /// api.openai.com or any hosted compatible endpoint; API key required.
    Cloud,
    /// LM Studio's local server; API key optional.
    LmStudio,
}

impl OpenAiFlavor {
    fn id(self) -> ProviderId {
        match self {
            OpenAiFlavor::Cloud => ProviderId::OpenAi,
            OpenAiFlavor::LmStudio => ProviderId::LmStudio,
        }
    }

    fn name(self) -> &'static str {
        self.id().display_name()
    }
}

/// Per-flavour view of the settings.
struct Endpoint<'a> {
    base_url: String,
    api_key: &'a str,
    organization: &'a str,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    #[serde(default)]
    id: String,
}

pub struct OpenAiCompatProvider {
    http: Arc<dyn HttpClient>,
    flavor: OpenAiFlavor,
}

impl OpenAiCompatProvider {
    pub fn new(http: Arc<dyn HttpClient>, flavor: OpenAiFlavor) -> Self {
        Self { http, flavor }
    }

    pub fn cloud(http: Arc<dyn HttpClient>) -> Self {
        Self::new(http, OpenAiFlavor::Cloud)
    }

    pub fn lm_studio(http: Arc<dyn HttpClient>) -> Self {
        Self::new(http, OpenAiFlavor::LmStudio)
    }

    pub fn flavor(&self) -> OpenAiFlavor {
        self.flavor
    }

    fn endpoint<'a>(&self, settings: &'a Settings) -> Endpoint<'a> {
        match self.flavor {
            OpenAiFlavor::Cloud => Endpoint {
                base_url: base_url_or(&settings.openai_base_url, "https://api.openai.com"),
                api_key: settings.openai_api_key.trim(),
                organization: settings.openai_organization.trim(),
                temperature: settings.openai_temperature,
                max_tokens: settings.openai_max_tokens,
            },
            OpenAiFlavor::LmStudio => Endpoint {
                base_url: base_url_or(&settings.lmstudio_base_url, "http://localhost:1234"),
                api_key: settings.lmstudio_api_key.trim(),
                organization: "",
                temperature: settings.lmstudio_temperature,
                max_tokens: settings.lmstudio_max_tokens,
            },
        }
    }

    fn authorize(request: HttpRequest, endpoint: &Endpoint<'_>) -> HttpRequest {
        let mut request = request;
        if !endpoint.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", endpoint.api_key));
        }
        if !endpoint.organization.is_empty() {
            request = request.header("OpenAI-Organization", endpoint.organization);
        }
        request
    }

    /// Credential and model checks made before any request goes out.
    fn preflight<'a>(&self, settings: &'a Settings) -> Result<(Endpoint<'a>, &'a str), Pdf2MdError> {
        let endpoint = self.endpoint(settings);
        if self.flavor == OpenAiFlavor::Cloud && endpoint.api_key.is_empty() {
            return Err(Pdf2MdError::ProviderNotConfigured {
                provider: self.flavor.name().into(),
                hint: "OpenAI API key is missing".into(),
            });
        }
        let model = require_model(self.flavor.id(), settings)?;
        Ok((endpoint, model))
    }

    async fn complete(
        &self,
        ctx: &RunContext,
        endpoint: &Endpoint<'_>,
        model: &str,
        message: &Message,
    ) -> Result<String, Pdf2MdError> {
        ctx.check_cancelled()?;
        let body = json!({
            "model": model,
            "messages": [to_openai_message(message)],
            "temperature": endpoint.temperature,
            "max_tokens": endpoint.max_tokens,
            "stream": false,
        });
        let url = format!("{}/v1/chat/completions", endpoint.base_url);
        let request = Self::authorize(HttpRequest::post_json(url, &body), endpoint);

        let name = self.flavor.name();
        let response = expect_success(name, self.http.send(request).await?)?;
        let parsed: Value = response.json(name)?;
        parsed
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Pdf2MdError::MalformedResponse {
                provider: name.into(),
                detail: "empty response".into(),
            })
    }

    async fn get_json(&self, endpoint: &Endpoint<'_>, path: &str) -> Result<Value, Pdf2MdError> {
        let request = Self::authorize(HttpRequest::get(format!("{}{}", endpoint.base_url, path)), endpoint);
        let name = self.flavor.name();
        let response = expect_success(name, self.http.send(request).await?)?;
        response.json(name)
    }

    async fn list_models(&self, endpoint: &Endpoint<'_>) -> Result<Vec<String>, Pdf2MdError> {
        let value = self.get_json(endpoint, "/v1/models").await?;
        let models: ModelsResponse =
            serde_json::from_value(value).map_err(|e| Pdf2MdError::MalformedResponse {
                provider: self.flavor.name().into(),
                detail: e.to_string(),
            })?;
        Ok(models
            .data
            .into_iter()
            .map(|m| m.id)
            .filter(|id| !id.is_empty())
            .collect())
    }

    /// Some LM Studio builds only expose `/models`, as a bare array or under
    /// `models`, with entries that are strings or `{id}`/`{name}` objects.
    async fn list_models_legacy(&self, endpoint: &Endpoint<'_>) -> Result<Vec<String>, Pdf2MdError> {
        let value = self.get_json(endpoint, "/models").await?;
        let entries = match &value {
            Value::Array(items) => items.as_slice(),
            other => other
                .get("models")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
        };
        Ok(entries.iter().filter_map(model_name).collect())
    }
}

fn model_name(entry: &Value) -> Option<String> {
    let name = match entry {
        Value::String(s) => Some(s.as_str()),
        other => other
            .get("id")
            .and_then(Value::as_str)
            .or_else(|| other.get("name").and_then(Value::as_str)),
    }?;
    (!name.is_empty()).then(|| name.to_string())
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn id(&self) -> ProviderId {
        self.flavor.id()
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
                provider: self.flavor.name().into(),
            });
        }
        let (endpoint, model) = self.preflight(settings)?;
        let message = build_user_message(prompt, images, true);
        debug!(model, pages = images.len(), "Sending pages to {}", self.flavor.name());
        self.complete(ctx, &endpoint, model, &message).await
    }

    async fn process_text(
        &self,
        ctx: &RunContext,
        settings: &Settings,
        text: &str,
        prompt: &str,
    ) -> Result<String, Pdf2MdError> {
        let (endpoint, model) = self.preflight(settings)?;
        let message = Message::user_text(with_input(prompt, text));
        self.complete(ctx, &endpoint, model, &message).await
    }

    fn as_model_lister(&self) -> Option<&dyn ModelLister> {
        Some(self)
    }

    fn as_connection_probe(&self) -> Option<&dyn ConnectionProbe> {
        Some(self)
    }
}

#[async_trait]
impl ModelLister for OpenAiCompatProvider {
    async fn load_models(&self, settings: &mut Settings) -> bool {
        let listed = {
            let endpoint = self.endpoint(settings);
            match self.list_models(&endpoint).await {
                Ok(models) => Ok(models),
                Err(e) if self.flavor == OpenAiFlavor::LmStudio => {
                    debug!("LM Studio /v1/models failed ({}); trying /models", e);
                    self.list_models_legacy(&endpoint).await
                }
                Err(e) => Err(e),
            }
        };

        match (self.flavor, listed) {
            (OpenAiFlavor::Cloud, Ok(models)) => {
                settings.openai_models = models;
                true
            }
            (OpenAiFlavor::LmStudio, Ok(models)) => {
                settings.lmstudio_vision_models =
                    models.iter().filter(|m| is_vision_model_loose(m)).cloned().collect();
                settings.lmstudio_models = models;
                true
            }
            (flavor, Err(e)) => {
                if e.is_connection_refused() {
                    debug!("{} not reachable: {}", flavor.name(), e);
                } else {
                    warn!("Failed to load {} models: {}", flavor.name(), e);
                }
                match flavor {
                    OpenAiFlavor::Cloud => settings.openai_models.clear(),
                    OpenAiFlavor::LmStudio => {
                        settings.lmstudio_models.clear();
                        settings.lmstudio_vision_models.clear();
                    }
                }
                false
            }
        }
    }
}

#[async_trait]
impl ConnectionProbe for OpenAiCompatProvider {
    async fn test_connection(&self, settings: &Settings) -> bool {
        let endpoint = self.endpoint(settings);
        let request = Self::authorize(
            HttpRequest::get(format!("{}/v1/models", endpoint.base_url)),
            &endpoint,
        );
        match self.http.send(request).await {
            Ok(resp) => resp.status == 200,
            Err(e) => {
                debug!("{} connection test failed: {}", self.flavor.name(), e);
                false
            }
        }
    }
}
