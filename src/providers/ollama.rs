//! Local inference adapter for the Ollama generate API.
//!
//! Pages are split into chunks of `ollama_images_per_request` images and sent
//! one chunk per request, strictly in order. Each chunk is retried on
//! transient failures with a fixed delay.
//!
//! ## Why chunk at all?
//!
//! Most local vision models accept a single image per prompt, and a long
//! document in one request would blow past the server's context window. One
//! page per request is the default; users with larger models can raise it.
//!
//! ## Payload budget
//!
//! A serialised request larger than `ollama_max_request_chars` loses images
//! from the tail of its chunk until it fits or one image remains. Dropped
//! pages are logged; the first page of a chunk is never dropped.
//!
//! ## Text fallback
//!
//! When the model rejects images and `ollama_text_fallback` is set, the chunk
//! is OCR'd from temporary files and resent through [`Provider::process_text`]
//! on the same adapter, with the same retry settings.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::heuristics::{is_connection_refused, is_model_not_found, is_vision_model};
use super::retry::{with_retries, RetryPolicy};
use super::{
    expect_success, normalize_url, require_model, ConnectionProbe, ModelLister, Provider, RoundTripProbe,
};
use crate::config::{ProviderId, Settings};
use crate::error::Pdf2MdError;
use crate::http::{HttpClient, HttpRequest};
use crate::message::{build_user_message, to_ollama_prompt_and_images};
use crate::output::{join_chunks, ChunkResult};
use crate::pipeline::encode::decode_data_url;
use crate::progress::{ProgressEvent, RunContext};
use crate::prompts::{chunk_prompt, with_input, TINY_TEST_PROMPT};
use crate::tools::{OcrExtractor, OcrOptions};

const NAME: &str = "Ollama";

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub num_predict: u32,
}

/// Body of `POST /api/generate`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    pub stream: bool,
    pub options: GenerateOptions,
}

impl GenerateRequest {
    fn serialized(&self) -> Result<String, Pdf2MdError> {
        serde_json::to_string(self).map_err(|e| Pdf2MdError::Internal(format!("serialising generate request: {e}")))
    }
}

#[derive(Debug, Default, Deserialize)]
struct GenerateLine {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ShowResponse {
    #[serde(default)]
    capabilities: Vec<String>,
}

/// Drop images from the tail of `request` until its JSON form fits in
/// `budget` characters or a single image is left. Returns how many were
/// dropped.
pub fn trim_to_budget(request: &mut GenerateRequest, budget: usize) -> usize {
    let mut dropped = 0;
    while request.images.len() > 1 {
        let len = serde_json::to_string(request).map(|s| s.len()).unwrap_or(0);
        if len <= budget {
            break;
        }
        request.images.pop();
        dropped += 1;
    }
    dropped
}

/// Text of a generate response body, plain JSON or newline-delimited.
fn parse_generate_body(body: &str, streaming: bool) -> Result<String, Pdf2MdError> {
    let malformed = |detail: String| Pdf2MdError::MalformedResponse {
        provider: NAME.into(),
        detail,
    };

    let text = if streaming {
        let mut out = String::new();
        for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let parsed: GenerateLine =
                serde_json::from_str(line).map_err(|e| malformed(format!("invalid stream line: {e}")))?;
            if let Some(message) = parsed.error {
                return Err(Pdf2MdError::Backend {
                    provider: NAME.into(),
                    message,
                });
            }
            if let Some(fragment) = parsed.response {
                out.push_str(&fragment);
            }
        }
        out
    } else {
        let parsed: GenerateLine =
            serde_json::from_str(body).map_err(|e| malformed(format!("invalid JSON: {e}")))?;
        if let Some(message) = parsed.error {
            return Err(Pdf2MdError::Backend {
                provider: NAME.into(),
                message,
            });
        }
        parsed.response.unwrap_or_default()
    };

    if text.is_empty() {
        return Err(malformed("empty response".into()));
    }
    Ok(text)
}

// ── Adapter ──────────────────────────────────────────────────────────────

pub struct OllamaProvider {
    http: Arc<dyn HttpClient>,
    ocr: Arc<dyn OcrExtractor>,
}

impl OllamaProvider {
    pub fn new(http: Arc<dyn HttpClient>, ocr: Arc<dyn OcrExtractor>) -> Self {
        Self { http, ocr }
    }

    fn retry_policy(settings: &Settings) -> RetryPolicy {
        RetryPolicy::new(settings.ollama_retry_count, settings.retry_delay())
    }

    fn request(settings: &Settings, model: &str, prompt: String, images: Vec<String>, stream: bool) -> GenerateRequest {
        GenerateRequest {
            model: model.to_string(),
            prompt,
            images,
            stream,
            options: GenerateOptions {
                temperature: settings.ollama_temperature,
                num_predict: settings.ollama_num_predict,
            },
        }
    }

    async fn generate(&self, url: &str, body: &str, streaming: bool) -> Result<String, Pdf2MdError> {
        let response = self
            .http
            .send(HttpRequest::post_json_text(url, body.to_string()))
            .await?;
        let response = expect_success(NAME, response)?;
        parse_generate_body(&response.body, streaming)
    }

    /// Build, trim and send one chunk with retries.
    async fn run_chunk(
        &self,
        ctx: &RunContext,
        settings: &Settings,
        model: &str,
        chunk: &[String],
        prompt: &str,
        label: &str,
    ) -> Result<String, Pdf2MdError> {
        let message = build_user_message(&chunk_prompt(prompt, chunk.len()), chunk, false);
        let flat = to_ollama_prompt_and_images(&[message]);
        let stream = settings.ollama_enable_streaming;
        let mut request = Self::request(settings, model, flat.prompt, flat.images, stream);

        let dropped = trim_to_budget(&mut request, settings.ollama_max_request_chars);
        if dropped > 0 {
            warn!(
                "{}: request exceeded {} chars; dropped {} trailing image(s)",
                label, settings.ollama_max_request_chars, dropped
            );
            // The prompt must describe only the images actually sent.
            request.prompt = chunk_prompt(prompt, request.images.len());
        }

        let url = format!("{}/api/generate", normalize_url(&settings.ollama_url));
        let body = request.serialized()?;
        let (url, body) = (&url, &body);
        with_retries(ctx, Self::retry_policy(settings), label, move |_| {
            self.generate(url, body, stream)
        })
        .await
    }

    /// OCR the chunk's images and resend the text through `process_text`.
    async fn text_fallback(
        &self,
        ctx: &RunContext,
        settings: &Settings,
        chunk: &[String],
        prompt: &str,
    ) -> Result<String, Pdf2MdError> {
        let ocr_text = {
            let scratch = TempDir::with_prefix("pdf2md-ocr-")
                .map_err(|e| Pdf2MdError::OcrFailed { detail: e.to_string() })?;
            let mut paths: Vec<PathBuf> = Vec::with_capacity(chunk.len());
            for (i, data_url) in chunk.iter().enumerate() {
                let (bytes, ext) = decode_data_url(data_url)?;
                let path = scratch.path().join(format!("page-{}.{ext}", i + 1));
                tokio::fs::write(&path, &bytes)
                    .await
                    .map_err(|e| Pdf2MdError::OcrFailed { detail: e.to_string() })?;
                paths.push(path);
            }
            self.ocr.extract(&paths, &OcrOptions::from_settings(settings)).await?
            // `scratch` is removed here, before the text request goes out.
        };

        if ocr_text.trim().is_empty() {
            return Err(Pdf2MdError::OcrFailed {
                detail: "no text recognised".into(),
            });
        }
        self.process_text(ctx, settings, &ocr_text, prompt).await
    }

    async fn fetch_tags(&self, settings: &Settings) -> Result<Vec<String>, Pdf2MdError> {
        let url = format!("{}/api/tags", normalize_url(&settings.ollama_url));
        let response = expect_success(NAME, self.http.send(HttpRequest::get(url)).await?)?;
        let tags: TagsResponse = response.json(NAME)?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Whether `/api/show` lists `vision` among the model's capabilities.
    async fn show_reports_vision(&self, settings: &Settings, model: &str) -> bool {
        let url = format!("{}/api/show", normalize_url(&settings.ollama_url));
        let request = HttpRequest::post_json(url, &json!({ "model": model }));
        match self.http.send(request).await {
            Ok(resp) if resp.is_success() => resp
                .json::<ShowResponse>(NAME)
                .map(|show| show.capabilities.iter().any(|c| c == "vision"))
                .unwrap_or(false),
            _ => false,
        }
    }

    fn chunk_failure(settings: &Settings, index: usize, total: usize, error: &Pdf2MdError) -> Pdf2MdError {
        let text = error.diagnostic_text();
        let reason = if error.is_connection_refused() {
            format!("{error}. Ensure Ollama is running and the URL is correct.")
        } else if is_model_not_found(&text) {
            format!(
                "model '{}' not found. Try: ollama pull {}",
                settings.selected_model, settings.selected_model
            )
        } else {
            error.to_string()
        };
        debug!("Chunk {}/{} failed: {}", index, total, text);
        Pdf2MdError::ChunkFailed {
            chunk: index,
            total,
            reason,
        }
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Ollama
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
        let model = require_model(ProviderId::Ollama, settings)?;
        if !settings.ollama_assume_vision && !is_vision_model(model) {
            warn!(
                "Ollama model '{}' may not support images; consider a vision model such as llava",
                model
            );
        }

        let chunks: Vec<&[String]> = images.chunks(settings.images_per_request()).collect();
        let total = chunks.len();
        let mut results: Vec<ChunkResult> = Vec::with_capacity(total);
        let cancelled = |results: &[ChunkResult]| Pdf2MdError::Cancelled {
            completed_chunks: results.len(),
            partial: join_chunks(results, total),
        };

        for (index, chunk) in chunks.into_iter().enumerate() {
            let n = index + 1;
            if ctx.is_cancelled() {
                info!("Cancelled before chunk {}/{}", n, total);
                return Err(cancelled(&results));
            }
            ctx.report(ProgressEvent::chunk(n, total, format!("Processing chunk {n}/{total}")));

            let label = format!("Ollama chunk {n}/{total}");
            let text = match self.run_chunk(ctx, settings, model, chunk, prompt, &label).await {
                Ok(text) => text,
                Err(e) if e.is_cancelled() => return Err(cancelled(&results)),
                Err(e) if e.is_vision_rejection() && settings.ollama_text_fallback => {
                    info!("{}: model rejected images, retrying through OCR", label);
                    match self.text_fallback(ctx, settings, chunk, prompt).await {
                        Ok(text) => text,
                        Err(e) if e.is_cancelled() => return Err(cancelled(&results)),
                        Err(e) => return Err(Self::chunk_failure(settings, n, total, &e)),
                    }
                }
                Err(e) if e.is_vision_rejection() => {
                    return Err(Pdf2MdError::VisionUnsupported {
                        provider: NAME.into(),
                        model: model.to_string(),
                        detail: e.diagnostic_text(),
                    });
                }
                Err(e) => return Err(Self::chunk_failure(settings, n, total, &e)),
            };

            results.push(ChunkResult {
                chunk_index: index,
                text,
            });
            ctx.report(ProgressEvent::chunk(n, total, format!("Finished chunk {n}/{total}")));
        }

        ctx.status("All chunks processed");
        Ok(join_chunks(&results, total))
    }

    async fn process_text(
        &self,
        ctx: &RunContext,
        settings: &Settings,
        text: &str,
        prompt: &str,
    ) -> Result<String, Pdf2MdError> {
        let model = require_model(ProviderId::Ollama, settings)?;
        let request = Self::request(settings, model, with_input(prompt, text), Vec::new(), false);
        let url = format!("{}/api/generate", normalize_url(&settings.ollama_url));
        let body = request.serialized()?;
        let (url, body) = (&url, &body);
        with_retries(ctx, Self::retry_policy(settings), "Ollama text request", move |_| {
            self.generate(url, body, false)
        })
        .await
    }

    fn as_model_lister(&self) -> Option<&dyn ModelLister> {
        Some(self)
    }

    fn as_connection_probe(&self) -> Option<&dyn ConnectionProbe> {
        Some(self)
    }

    fn as_round_trip_probe(&self) -> Option<&dyn RoundTripProbe> {
        Some(self)
    }
}

#[async_trait]
impl ModelLister for OllamaProvider {
    async fn load_models(&self, settings: &mut Settings) -> bool {
        match self.fetch_tags(settings).await {
            Ok(models) => {
                settings.ollama_vision_models = models.iter().filter(|m| is_vision_model(m)).cloned().collect();
                settings.ollama_models = models;
                true
            }
            Err(e) => {
                if e.is_connection_refused() || is_connection_refused(&e.diagnostic_text()) {
                    debug!("Ollama not running: {}", e);
                } else {
                    warn!("Failed to load Ollama models: {}", e);
                }
                settings.ollama_models.clear();
                settings.ollama_vision_models.clear();
                false
            }
        }
    }
}

#[async_trait]
impl ConnectionProbe for OllamaProvider {
    async fn test_connection(&self, settings: &Settings) -> bool {
        let tags = match self.fetch_tags(settings).await {
            Ok(tags) => tags,
            Err(e) => {
                warn!("Failed to connect to Ollama: {}", e);
                return false;
            }
        };

        let model = settings.selected_model.trim();
        if model.is_empty() {
            return true;
        }
        if !tags.iter().any(|t| t == model) {
            warn!("Ollama: model '{}' not found. Pull it via 'ollama pull {}'", model, model);
            return false;
        }

        let vision_ok = settings.ollama_assume_vision
            || is_vision_model(model)
            || self.show_reports_vision(settings, model).await;
        if !vision_ok {
            warn!("Ollama: model '{}' may not support images", model);
        }
        true
    }
}

#[async_trait]
impl RoundTripProbe for OllamaProvider {
    /// Minimal round trip used by diagnostics: expects the model to answer `OK`.
    async fn tiny_test(&self, settings: &Settings) -> Result<bool, Pdf2MdError> {
        let body = json!({
            "model": settings.selected_model,
            "prompt": TINY_TEST_PROMPT,
            "stream": false,
            "options": { "temperature": 0, "num_predict": 16 },
        });
        let url = format!("{}/api/generate", normalize_url(&settings.ollama_url));
        let response = expect_success(NAME, self.http.send(HttpRequest::post_json(url, &body)).await?)?;
        let text = parse_generate_body(&response.body, false)?;
        Ok(text.trim() == "OK")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::{refused, ScriptedClient};
    use crate::http::HttpResponse;
    use crate::progress::CancelFlag;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    struct StubOcr {
        files_existed: AtomicBool,
        seen: Mutex<Vec<PathBuf>>,
    }

    impl StubOcr {
        fn new() -> Self {
            Self {
                files_existed: AtomicBool::new(false),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl OcrExtractor for StubOcr {
        async fn extract(&self, paths: &[PathBuf], _options: &OcrOptions) -> Result<String, Pdf2MdError> {
            self.files_existed
                .store(paths.iter().all(|p| p.exists()), Ordering::SeqCst);
            self.seen.lock().unwrap().extend(paths.iter().cloned());
            Ok("OCR TEXT".into())
        }

        async fn is_available(&self, _settings: &Settings) -> bool {
            true
        }
    }

    fn settings() -> Settings {
        Settings::builder()
            .provider(ProviderId::Ollama)
            .model("llava:13b")
            .retry_delay_ms(0)
            .build()
            .unwrap()
    }

    /// Data URL whose payload names the page, so echoed output shows order.
    fn pages(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("data:image/png;base64,UDE{i}")).collect()
    }

    /// Replies with the payloads of the request's images.
    fn echo_images(req: &HttpRequest) -> Result<HttpResponse, Pdf2MdError> {
        let body = req.json_body().unwrap();
        let names: Vec<String> = body["images"]
            .as_array()
            .map(|a| a.iter().map(|v| v.as_str().unwrap().to_string()).collect())
            .unwrap_or_default();
        Ok(HttpResponse::new(200, json!({ "response": names.join("+") }).to_string()))
    }

    fn provider(http: Arc<ScriptedClient>) -> OllamaProvider {
        OllamaProvider::new(http, Arc::new(StubOcr::new()))
    }

    #[tokio::test]
    async fn chunks_in_order_with_markers() {
        let http = Arc::new(ScriptedClient::new(|req, _| echo_images(req)));
        let s = Settings {
            ollama_images_per_request: 2,
            ..settings()
        };
        let out = provider(http.clone())
            .process_images(&RunContext::new(), &s, &pages(5), "Extract")
            .await
            .unwrap();

        assert_eq!(http.calls(), 3);
        assert_eq!(
            out,
            "<!-- chunk:1/3 -->\nUDE1+UDE2\n\n<!-- chunk:2/3 -->\nUDE3+UDE4\n\n<!-- chunk:3/3 -->\nUDE5"
        );

        let first = http.request(0).json_body().unwrap();
        assert_eq!(first["model"], "llava:13b");
        assert_eq!(first["stream"], false);
        assert_eq!(first["options"]["num_predict"], 4096);
        assert!(first["prompt"].as_str().unwrap().contains("consecutive pages"));
        let last = http.request(2).json_body().unwrap();
        assert_eq!(last["prompt"], "Extract");
        assert_eq!(http.request(0).url, "http://localhost:11434/api/generate");
    }

    #[tokio::test]
    async fn chunking_partitions_pages_for_any_size() {
        for n in 1..=7usize {
            for k in 1..=4usize {
                let http = Arc::new(ScriptedClient::new(|req, _| echo_images(req)));
                let s = Settings {
                    ollama_images_per_request: k,
                    ..settings()
                };
                let input = pages(n);
                provider(http.clone())
                    .process_images(&RunContext::new(), &s, &input, "Extract")
                    .await
                    .unwrap();

                let chunks = n.div_ceil(k);
                assert_eq!(http.calls(), chunks, "n={n} k={k}");
                let mut rebuilt = Vec::new();
                for i in 0..chunks {
                    let body = http.request(i).json_body().unwrap();
                    let images: Vec<String> = body["images"]
                        .as_array()
                        .unwrap()
                        .iter()
                        .map(|v| format!("data:image/png;base64,{}", v.as_str().unwrap()))
                        .collect();
                    if i + 1 < chunks {
                        assert_eq!(images.len(), k, "n={n} k={k} chunk={i}");
                    } else {
                        assert!((1..=k).contains(&images.len()), "n={n} k={k} last chunk");
                    }
                    rebuilt.extend(images);
                }
                assert_eq!(rebuilt, input, "n={n} k={k}");
            }
        }
    }

    #[tokio::test]
    async fn single_chunk_is_marked() {
        let http = Arc::new(ScriptedClient::new(|req, _| echo_images(req)));
        let out = provider(http)
            .process_images(&RunContext::new(), &settings(), &pages(1), "Extract")
            .await
            .unwrap();
        assert_eq!(out, "<!-- chunk:1/1 -->\nUDE1");
    }

    #[tokio::test]
    async fn retry_mid_sequence_keeps_order() {
        // Calls: 0 → chunk 1, 1 and 2 → chunk 2 fails twice, 3 → chunk 2, 4 → chunk 3.
        let http = Arc::new(ScriptedClient::new(|req, i| {
            if i == 1 || i == 2 {
                Ok(HttpResponse::new(503, "{\"error\":\"busy\"}"))
            } else {
                echo_images(req)
            }
        }));
        let out = provider(http.clone())
            .process_images(&RunContext::new(), &settings(), &pages(3), "Extract")
            .await
            .unwrap();
        assert_eq!(http.calls(), 5);
        assert_eq!(
            out,
            "<!-- chunk:1/3 -->\nUDE1\n\n<!-- chunk:2/3 -->\nUDE2\n\n<!-- chunk:3/3 -->\nUDE3"
        );
    }

    #[tokio::test]
    async fn persistent_500_exhausts_retries() {
        let http = Arc::new(ScriptedClient::fixed(500, "{\"error\":\"internal\"}"));
        let err = provider(http.clone())
            .process_images(&RunContext::new(), &settings(), &pages(1), "Extract")
            .await
            .unwrap_err();
        assert_eq!(http.calls(), 3);
        assert!(matches!(err, Pdf2MdError::ChunkFailed { chunk: 1, total: 1, .. }));
    }

    #[tokio::test]
    async fn refused_connection_gets_a_hint() {
        let http = Arc::new(ScriptedClient::new(|req, _| Err(refused(&req.url))));
        let err = provider(http)
            .process_images(&RunContext::new(), &settings(), &pages(1), "Extract")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Ensure Ollama is running"), "{err}");
    }

    #[tokio::test]
    async fn cancellation_before_second_chunk_keeps_first() {
        let flag = CancelFlag::new();
        let trip = flag.clone();
        let http = Arc::new(ScriptedClient::new(move |req, _| {
            trip.cancel();
            echo_images(req)
        }));
        let ctx = RunContext::with_cancel_flag(flag);
        let err = provider(http.clone())
            .process_images(&ctx, &settings(), &pages(3), "Extract")
            .await
            .unwrap_err();

        assert_eq!(http.calls(), 1);
        match err {
            Pdf2MdError::Cancelled {
                completed_chunks,
                partial,
            } => {
                assert_eq!(completed_chunks, 1);
                assert!(partial.contains("UDE1"));
            }
            other => panic!("expected Cancelled, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn streaming_lines_are_concatenated() {
        let http = Arc::new(ScriptedClient::fixed(
            200,
            "{\"response\":\"# Ti\",\"done\":false}\n{\"response\":\"tle\",\"done\":false}\n{\"response\":\"\",\"done\":true}\n",
        ));
        let s = Settings::builder()
            .provider(ProviderId::Ollama)
            .model("llava")
            .streaming(true)
            .build()
            .unwrap();
        let out = provider(http.clone())
            .process_images(&RunContext::new(), &s, &pages(1), "Extract")
            .await
            .unwrap();
        assert_eq!(out, "<!-- chunk:1/1 -->\n# Title");
        assert_eq!(http.request(0).json_body().unwrap()["stream"], true);
    }

    #[test]
    fn stream_error_line_is_backend_error() {
        let err = parse_generate_body("{\"response\":\"a\"}\n{\"error\":\"out of memory\"}\n", true).unwrap_err();
        assert!(matches!(err, Pdf2MdError::Backend { .. }));
    }

    #[test]
    fn missing_response_is_malformed() {
        let err = parse_generate_body("{\"done\":true}", false).unwrap_err();
        assert!(matches!(err, Pdf2MdError::MalformedResponse { .. }));
    }

    #[test]
    fn trimming_drops_from_tail_until_fit() {
        let s = settings();
        let images: Vec<String> = (0..4).map(|i| format!("{i}").repeat(100)).collect();
        let mut req = OllamaProvider::request(&s, "llava", "Extract".into(), images.clone(), false);

        let mut two = req.clone();
        two.images.truncate(2);
        let budget = serde_json::to_string(&two).unwrap().len();

        assert_eq!(trim_to_budget(&mut req, budget), 2);
        assert_eq!(req.images, images[..2].to_vec());
    }

    #[test]
    fn trimming_never_drops_the_last_image() {
        let s = settings();
        let images: Vec<String> = (0..3).map(|_| "A".repeat(1000)).collect();
        let mut req = OllamaProvider::request(&s, "llava", "Extract".into(), images, false);
        assert_eq!(trim_to_budget(&mut req, 10), 2);
        assert_eq!(req.images.len(), 1);
    }

    #[tokio::test]
    async fn oversized_request_sends_fewer_images() {
        let http = Arc::new(ScriptedClient::new(|req, _| echo_images(req)));
        let s = Settings {
            ollama_images_per_request: 3,
            ollama_max_request_chars: 50,
            ..settings()
        };
        let out = provider(http.clone())
            .process_images(&RunContext::new(), &s, &pages(3), "Extract")
            .await
            .unwrap();
        assert_eq!(out, "<!-- chunk:1/1 -->\nUDE1");
        // One image left, so the consecutive-pages hint is gone.
        assert_eq!(http.request(0).json_body().unwrap()["prompt"], "Extract");
    }

    #[tokio::test]
    async fn trimmed_chunk_keeps_hint_while_several_images_remain() {
        let http = Arc::new(ScriptedClient::new(|req, _| echo_images(req)));
        let full = OllamaProvider::request(&settings(), "llava:13b", chunk_prompt("Extract", 4), vec![], false);
        let mut two = full.clone();
        two.images = vec!["UDE1".into(), "UDE2".into()];
        let budget = serde_json::to_string(&two).unwrap().len();
        let s = Settings {
            ollama_images_per_request: 4,
            ollama_max_request_chars: budget,
            ..settings()
        };

        let out = provider(http.clone())
            .process_images(&RunContext::new(), &s, &pages(4), "Extract")
            .await
            .unwrap();
        assert_eq!(out, "<!-- chunk:1/1 -->\nUDE1+UDE2");
        assert_eq!(
            http.request(0).json_body().unwrap()["prompt"],
            chunk_prompt("Extract", 2).as_str()
        );
    }

    #[tokio::test]
    async fn vision_rejection_falls_back_to_ocr() {
        let http = Arc::new(ScriptedClient::new(|req, _| {
            let body = req.json_body().unwrap();
            if body.get("images").is_some() {
                Ok(HttpResponse::new(
                    500,
                    "{\"error\":\"this model does not support image input\"}",
                ))
            } else {
                Ok(HttpResponse::new(200, "{\"response\":\"from text\"}"))
            }
        }));
        let ocr = Arc::new(StubOcr::new());
        let provider = OllamaProvider::new(http.clone(), ocr.clone());
        let s = Settings {
            ollama_text_fallback: true,
            ..settings()
        };
        let out = provider
            .process_images(&RunContext::new(), &s, &pages(1), "Extract")
            .await
            .unwrap();

        assert_eq!(out, "<!-- chunk:1/1 -->\nfrom text");
        // One rejected image request (not retried), one text request.
        assert_eq!(http.calls(), 2);
        assert_eq!(http.request(1).json_body().unwrap()["prompt"], "Extract\n\nOCR TEXT");
        assert!(ocr.files_existed.load(Ordering::SeqCst));
        assert!(ocr.seen.lock().unwrap().iter().all(|p| !p.exists()));
    }

    #[tokio::test]
    async fn vision_rejection_without_fallback_is_surfaced() {
        let http = Arc::new(ScriptedClient::fixed(
            500,
            "{\"error\":\"image input unsupported by this model\"}",
        ));
        let err = provider(http.clone())
            .process_images(&RunContext::new(), &settings(), &pages(1), "Extract")
            .await
            .unwrap_err();
        assert_eq!(http.calls(), 1);
        assert!(matches!(err, Pdf2MdError::VisionUnsupported { .. }));
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let http = Arc::new(ScriptedClient::fixed(200, "{}"));
        let err = provider(http)
            .process_images(&RunContext::new(), &settings(), &[], "Extract")
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2MdError::EmptyInput { .. }));
    }

    #[tokio::test]
    async fn load_models_fills_lists() {
        let http = Arc::new(ScriptedClient::fixed(
            200,
            "{\"models\":[{\"name\":\"llava:13b\"},{\"name\":\"llama3:8b\"}]}",
        ));
        let mut s = settings();
        assert!(provider(http).load_models(&mut s).await);
        assert_eq!(s.ollama_models, vec!["llava:13b", "llama3:8b"]);
        assert_eq!(s.ollama_vision_models, vec!["llava:13b"]);
    }

    #[tokio::test]
    async fn load_models_clears_on_refusal() {
        let http = Arc::new(ScriptedClient::new(|req, _| Err(refused(&req.url))));
        let mut s = settings();
        s.ollama_models = vec!["stale".into()];
        assert!(!provider(http).load_models(&mut s).await);
        assert!(s.ollama_models.is_empty());
    }

    #[tokio::test]
    async fn connection_test_requires_model() {
        let http = Arc::new(ScriptedClient::fixed(200, "{\"models\":[{\"name\":\"mistral\"}]}"));
        assert!(!provider(http).test_connection(&settings()).await);
    }

    #[tokio::test]
    async fn connection_test_consults_show_for_unknown_names() {
        let http = Arc::new(ScriptedClient::new(|req, _| {
            if req.url.ends_with("/api/tags") {
                Ok(HttpResponse::new(200, "{\"models\":[{\"name\":\"gemma3:12b\"}]}"))
            } else {
                Ok(HttpResponse::new(200, "{\"capabilities\":[\"completion\",\"vision\"]}"))
            }
        }));
        let s = Settings {
            selected_model: "gemma3:12b".into(),
            ..settings()
        };
        assert!(provider(http.clone()).test_connection(&s).await);
        assert_eq!(http.calls(), 2);
        assert!(http.request(1).url.ends_with("/api/show"));
    }

    #[tokio::test]
    async fn tiny_test_expects_ok() {
        let http = Arc::new(ScriptedClient::fixed(200, "{\"response\":\" OK\\n\"}"));
        assert!(provider(http.clone()).tiny_test(&settings()).await.unwrap());
        let body = http.request(0).json_body().unwrap();
        assert_eq!(body["options"]["num_predict"], 16);
        assert_eq!(body["prompt"], TINY_TEST_PROMPT);
    }
}
