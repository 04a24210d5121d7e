//! End-to-end pipeline tests with stub providers, a scripted HTTP client and
//! a temp-dir vault. No network, no external tools.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pdf2md_notes::providers::OllamaProvider;
use pdf2md_notes::tools::OcrOptions;
use pdf2md_notes::{
    generate_markdown, CancelFlag, Converter, DocumentStore, FixedDecision, HttpClient, HttpRequest,
    HttpResponse, LocalStore, OcrExtractor, OverwriteDecision, PageRasterizer, Pdf2MdError, ProgressEvent,
    ProgressSink, Provider, ProviderId, ProviderRegistry, RunContext, Settings, WriteOutcome,
};
use tempfile::TempDir;

const PNG_A: &str = "data:image/png;base64,QQ==";
const PNG_B: &str = "data:image/png;base64,Qg==";
const PNG_C: &str = "data:image/png;base64,Qw==";

// ── Stubs ────────────────────────────────────────────────────────────────

/// Answers image requests with the prompt length and text requests from a
/// queue (falling back to echoing the input text).
struct EchoProvider {
    id: ProviderId,
    text_answers: Mutex<Vec<String>>,
}

impl EchoProvider {
    fn new(id: ProviderId) -> Self {
        Self::with_text_answers(id, Vec::new())
    }

    fn with_text_answers(id: ProviderId, answers: Vec<&str>) -> Self {
        Self {
            id,
            text_answers: Mutex::new(answers.into_iter().map(String::from).collect()),
        }
    }
}

#[async_trait]
impl Provider for EchoProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn process_images(
        &self,
        _ctx: &RunContext,
        _settings: &Settings,
        _images: &[String],
        prompt: &str,
    ) -> Result<String, Pdf2MdError> {
        Ok(prompt.len().to_string())
    }

    async fn process_text(
        &self,
        _ctx: &RunContext,
        _settings: &Settings,
        text: &str,
        _prompt: &str,
    ) -> Result<String, Pdf2MdError> {
        let mut answers = self.text_answers.lock().unwrap();
        if answers.is_empty() {
            Ok(text.to_string())
        } else {
            Ok(answers.remove(0))
        }
    }
}

/// Always returns the same Markdown.
struct FixedProvider(&'static str);

#[async_trait]
impl Provider for FixedProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    async fn process_images(
        &self,
        _ctx: &RunContext,
        _settings: &Settings,
        _images: &[String],
        _prompt: &str,
    ) -> Result<String, Pdf2MdError> {
        Ok(self.0.to_string())
    }

    async fn process_text(
        &self,
        _ctx: &RunContext,
        _settings: &Settings,
        _text: &str,
        _prompt: &str,
    ) -> Result<String, Pdf2MdError> {
        Ok(self.0.to_string())
    }
}

struct StubRasterizer(Vec<&'static str>);

#[async_trait]
impl PageRasterizer for StubRasterizer {
    async fn rasterize(&self, _pdf: &[u8], _settings: &Settings) -> Result<Vec<String>, Pdf2MdError> {
        Ok(self.0.iter().map(|s| s.to_string()).collect())
    }

    async fn is_available(&self, _settings: &Settings) -> bool {
        true
    }
}

struct NoOcr;

#[async_trait]
impl OcrExtractor for NoOcr {
    async fn extract(&self, _paths: &[PathBuf], _options: &OcrOptions) -> Result<String, Pdf2MdError> {
        Err(Pdf2MdError::OcrFailed {
            detail: "not available in tests".into(),
        })
    }

    async fn is_available(&self, _settings: &Settings) -> bool {
        false
    }
}

type Handler = Box<dyn Fn(&HttpRequest, usize) -> Result<HttpResponse, Pdf2MdError> + Send + Sync>;

/// Scripted Ollama server; records every request.
struct FakeOllama {
    handler: Handler,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeOllama {
    fn new(handler: impl Fn(&HttpRequest, usize) -> Result<HttpResponse, Pdf2MdError> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpClient for FakeOllama {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, Pdf2MdError> {
        let n = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len() - 1
        };
        (self.handler)(&request, n)
    }
}

/// The single bare-base64 image of a generate request.
fn image_of(request: &HttpRequest) -> String {
    request
        .json_body()
        .and_then(|body| body["images"][0].as_str().map(String::from))
        .unwrap_or_default()
}

fn generate_ok(text: &str) -> HttpResponse {
    HttpResponse::new(200, serde_json::json!({ "response": text, "done": true }).to_string())
}

fn ollama_settings() -> Settings {
    Settings::builder()
        .provider(ProviderId::Ollama)
        .model("llava:7b")
        .images_per_request(1)
        .retry_count(2)
        .retry_delay_ms(0)
        .build()
        .unwrap()
}

#[derive(Default)]
struct Recorder(Mutex<Vec<ProgressEvent>>);

impl ProgressSink for Recorder {
    fn on_event(&self, event: &ProgressEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn vault() -> (TempDir, Arc<LocalStore>) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalStore::new(dir.path()));
    (dir, store)
}

fn converter(provider: Arc<dyn Provider>, pages: Vec<&'static str>, store: Arc<LocalStore>) -> Converter {
    Converter::new(
        Arc::new(ProviderRegistry::from_providers([provider])),
        Arc::new(StubRasterizer(pages)),
        store,
    )
}

fn anthropic_settings() -> Settings {
    let mut s = Settings::default();
    s.anthropic_api_key = "sk-test".into();
    s
}

async fn read(store: &LocalStore, path: &str) -> String {
    String::from_utf8(store.read_bytes(path).await.unwrap()).unwrap()
}

// ── AI stage ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn initial_markdown_is_the_provider_output() {
    let provider = EchoProvider::new(ProviderId::Anthropic);
    let (md, passes) = generate_markdown(
        &RunContext::new(),
        &provider,
        &Settings::default(),
        &[PNG_A.to_string()],
        "Extract text",
    )
    .await
    .unwrap();
    assert_eq!(md, "12");
    assert_eq!(passes, 0);
}

#[tokio::test]
async fn empty_second_pass_keeps_previous_text() {
    let provider = EchoProvider::with_text_answers(ProviderId::Anthropic, vec![""]);
    let settings = Settings::builder().multi_pass(true, false).build().unwrap();
    let (md, passes) = generate_markdown(&RunContext::new(), &provider, &settings, &[PNG_A.to_string()], "Extract text")
        .await
        .unwrap();
    assert_eq!(md, "12");
    assert_eq!(passes, 0);
}

// ── Local-inference adapter through the scripted server ─────────────────

#[tokio::test]
async fn persistent_server_error_is_attempted_three_times() {
    let http = FakeOllama::new(|_, _| Ok(HttpResponse::new(500, "boom")));
    let provider = OllamaProvider::new(http.clone(), Arc::new(NoOcr));

    let err = provider
        .process_images(&RunContext::new(), &ollama_settings(), &[PNG_A.to_string()], "Extract")
        .await
        .unwrap_err();
    assert!(matches!(err, Pdf2MdError::ChunkFailed { chunk: 1, total: 1, .. }), "{err:?}");
    assert_eq!(http.calls(), 3);
}

#[tokio::test]
async fn chunk_order_survives_retries() {
    let failures = Arc::new(AtomicUsize::new(0));
    let counter = failures.clone();
    let http = FakeOllama::new(move |req, _| match image_of(req).as_str() {
        "QQ==" => Ok(generate_ok("page A")),
        "Qg==" if counter.fetch_add(1, Ordering::SeqCst) < 2 => Ok(HttpResponse::new(503, "busy")),
        "Qg==" => Ok(generate_ok("page B")),
        _ => Ok(generate_ok("page C")),
    });
    let provider = OllamaProvider::new(http.clone(), Arc::new(NoOcr));
    let images = [PNG_A.to_string(), PNG_B.to_string(), PNG_C.to_string()];

    let md = provider
        .process_images(&RunContext::new(), &ollama_settings(), &images, "Extract")
        .await
        .unwrap();
    assert_eq!(
        md,
        "<!-- chunk:1/3 -->\npage A\n\n<!-- chunk:2/3 -->\npage B\n\n<!-- chunk:3/3 -->\npage C"
    );
    assert_eq!(http.calls(), 5);
}

#[tokio::test]
async fn cancelling_during_chunk_one_stops_before_chunk_two() {
    let flag = CancelFlag::new();
    let remote = flag.clone();
    let http = FakeOllama::new(move |_, _| {
        remote.cancel();
        Ok(generate_ok("page A"))
    });
    let provider = OllamaProvider::new(http.clone(), Arc::new(NoOcr));
    let ctx = RunContext::with_cancel_flag(flag);
    let images = [PNG_A.to_string(), PNG_B.to_string(), PNG_C.to_string()];

    let err = provider
        .process_images(&ctx, &ollama_settings(), &images, "Extract")
        .await
        .unwrap_err();
    match err {
        Pdf2MdError::Cancelled {
            completed_chunks,
            partial,
        } => {
            assert_eq!(completed_chunks, 1);
            assert!(partial.contains("page A"));
        }
        other => panic!("expected cancellation, got {other:?}"),
    }
    assert_eq!(http.calls(), 1);
}

#[tokio::test]
async fn chunk_progress_reaches_the_sink() {
    let http = FakeOllama::new(|_, _| Ok(generate_ok("ok")));
    let provider = OllamaProvider::new(http, Arc::new(NoOcr));
    let ctx = RunContext::new();
    let recorder = Arc::new(Recorder::default());
    ctx.set_reporter(recorder.clone());

    provider
        .process_images(&ctx, &ollama_settings(), &[PNG_A.to_string(), PNG_B.to_string()], "Extract")
        .await
        .unwrap();

    let events = recorder.0.lock().unwrap();
    let chunk_totals: Vec<_> = events.iter().filter_map(|e| e.total).collect();
    assert!(!chunk_totals.is_empty());
    assert!(chunk_totals.iter().all(|&t| t == 2));
    assert_eq!(events.last().unwrap().message, "All chunks processed");
}

// ── Converter ────────────────────────────────────────────────────────────

#[tokio::test]
async fn pdf_becomes_a_templated_note_next_to_the_source() {
    let (_dir, store) = vault();
    store.write_text("Inbox/scan.pdf", "%PDF-1.4 stub").await.unwrap();
    let conv = converter(Arc::new(FixedProvider("# Title")), vec![PNG_A, PNG_B], store.clone());

    let mut settings = anthropic_settings();
    settings.post_processing_template = "---\nsource: pdf\n---\n\n{{content}}".into();
    let out = conv.process_pdf(&RunContext::new(), &settings, "Inbox/scan.pdf").await.unwrap();

    assert_eq!(out.output_path, "Inbox/scan.md");
    assert_eq!(out.write, WriteOutcome::Created);
    assert_eq!(out.stats.page_count, 2);
    assert!(out.stats.template_applied);
    assert_eq!(read(&store, "Inbox/scan.md").await, "---\nsource: pdf\n---\n\n# Title");
}

#[tokio::test]
async fn output_folder_embed_and_move() {
    let (_dir, store) = vault();
    store.write_text("Inbox/scan.pdf", "%PDF-1.4 stub").await.unwrap();
    store.write_text("Done/scan.pdf", "%PDF older").await.unwrap();
    let conv = converter(Arc::new(FixedProvider("body")), vec![PNG_A], store.clone());

    let mut settings = anthropic_settings();
    settings.enable_post_processing = false;
    settings.embed_pdf = true;
    settings.output_folder = "Notes".into();
    settings.move_processed_pdfs = true;
    settings.processed_pdf_folder = "Done".into();

    let out = conv.process_pdf(&RunContext::new(), &settings, "Inbox/scan.pdf").await.unwrap();
    assert_eq!(out.output_path, "Notes/scan.md");
    assert_eq!(read(&store, "Notes/scan.md").await, "body\n\n![[scan.pdf]]");
    assert_eq!(out.moved_to.as_deref(), Some("Done/scan 1.pdf"));
    assert!(!store.exists("Inbox/scan.pdf").await);
}

#[tokio::test]
async fn same_input_twice_gives_identical_markdown() {
    let (_dir, store) = vault();
    store.write_text("a.pdf", "%PDF-1.4").await.unwrap();
    let conv = converter(Arc::new(FixedProvider("# Same")), vec![PNG_A], store.clone());
    let mut settings = anthropic_settings();
    settings.post_processing_template = "tags: [x]\n\n{{content}}".into();

    let first = conv.process_pdf(&RunContext::new(), &settings, "a.pdf").await.unwrap();
    let second = conv.process_pdf(&RunContext::new(), &settings, "a.pdf").await.unwrap();
    assert_eq!(first.markdown, second.markdown);
    assert_eq!(first.output_path, "a.md");
    assert_eq!(second.output_path, "a 1.md");
    assert_eq!(read(&store, "a.md").await, read(&store, "a 1.md").await);
}

#[tokio::test]
async fn existing_note_is_overwritten_or_skipped_and_move_still_runs() {
    for (decision, expected_outcome, expected_text) in [
        (OverwriteDecision::Overwrite, WriteOutcome::Overwritten, "new"),
        (OverwriteDecision::Skip, WriteOutcome::Skipped, "old"),
    ] {
        let (_dir, store) = vault();
        store.write_text("x.pdf", "%PDF-1.4").await.unwrap();
        store.write_text("x.md", "old").await.unwrap();
        let conv = converter(Arc::new(FixedProvider("new")), vec![PNG_A], store.clone())
            .with_confirm(Arc::new(FixedDecision(decision)));

        let mut settings = anthropic_settings();
        settings.enable_post_processing = false;
        settings.move_processed_pdfs = true;
        settings.processed_pdf_folder = "Processed PDFs".into();

        let out = conv.process_pdf(&RunContext::new(), &settings, "x.pdf").await.unwrap();
        assert_eq!(out.write, expected_outcome);
        assert_eq!(read(&store, "x.md").await, expected_text);
        assert_eq!(out.moved_to.as_deref(), Some("Processed PDFs/x.pdf"));
    }
}

#[tokio::test]
async fn template_without_content_falls_back_to_raw_text() {
    let (_dir, store) = vault();
    store.write_text("x.pdf", "%PDF-1.4").await.unwrap();
    let conv = converter(Arc::new(FixedProvider("raw")), vec![PNG_A], store.clone());
    let mut settings = anthropic_settings();
    settings.post_processing_template = "---\ndate: {{date}}\n---".into();

    let out = conv.process_pdf(&RunContext::new(), &settings, "x.pdf").await.unwrap();
    assert_eq!(out.markdown, "raw");
    assert!(!out.stats.template_applied);
}

#[tokio::test]
async fn no_pages_is_an_extraction_failure() {
    let (_dir, store) = vault();
    store.write_text("x.pdf", "%PDF-1.4").await.unwrap();
    let conv = converter(Arc::new(FixedProvider("never")), vec![], store.clone());

    let err = conv.process_pdf(&RunContext::new(), &anthropic_settings(), "x.pdf").await.unwrap_err();
    assert!(matches!(err, Pdf2MdError::ExtractionFailed { .. }));
    assert!(!store.exists("x.md").await);
}

#[tokio::test]
async fn missing_key_fails_before_reading_the_source() {
    let (_dir, store) = vault();
    let conv = converter(Arc::new(FixedProvider("never")), vec![PNG_A], store);
    let err = conv
        .process_pdf(&RunContext::new(), &Settings::default(), "absent.pdf")
        .await
        .unwrap_err();
    assert!(matches!(err, Pdf2MdError::ProviderNotConfigured { .. }));
}

#[tokio::test]
async fn image_files_are_named_after_the_first_one() {
    let (_dir, store) = vault();
    store.write_text("Photos/p2.jpg", "two").await.unwrap();
    store.write_text("Photos/p1.png", "one").await.unwrap();
    let conv = converter(Arc::new(FixedProvider("# Photos")), vec![], store.clone());
    let mut settings = anthropic_settings();
    settings.enable_post_processing = false;

    let out = conv
        .process_image_files(&RunContext::new(), &settings, &["Photos/p2.jpg".into(), "Photos/p1.png".into()])
        .await
        .unwrap();
    assert_eq!(out.output_path, "Photos/p2.md");
    assert_eq!(out.stats.page_count, 2);
}

#[tokio::test]
async fn status_events_follow_the_run_order() {
    let (_dir, store) = vault();
    store.write_text("x.pdf", "%PDF-1.4").await.unwrap();
    let conv = converter(Arc::new(FixedProvider("x")), vec![PNG_A], store);
    let ctx = RunContext::new();
    let recorder = Arc::new(Recorder::default());
    ctx.set_reporter(recorder.clone());

    conv.process_pdf(&ctx, &anthropic_settings(), "x.pdf").await.unwrap();
    let messages: Vec<String> = recorder.0.lock().unwrap().iter().map(|e| e.message.clone()).collect();
    assert_eq!(
        messages,
        [
            "Extracting page images",
            "Sending images to AI provider",
            "Post-processing markdown",
            "Writing output file",
            "Done"
        ]
    );
}
