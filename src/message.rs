//! Vendor-neutral chat messages and their wire translations.
//!
//! Adapters build a [`Message`] from a prompt and an ordered list of page
//! data URLs, then hand it to the translator for their backend. Part order is
//! significant: interleaved text and images mirror page order.
//!
//! ```text
//! build_user_message ──▶ Message ──┬─▶ to_anthropic_content   {type:image, source:{base64}}
//!                                  ├─▶ to_openai_content      {type:image_url, image_url:{url}}
//!                                  └─▶ to_ollama_request      {prompt, images:[bare base64]}
//! ```
//!
//! Image parts never hold a data-URL prefix; [`split_data_url`] strips it at
//! the ingestion boundary and never fails.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// MIME types the backends are known to accept.
pub const SUPPORTED_IMAGE_TYPES: [&str; 3] = ["image/png", "image/jpeg", "image/webp"];

const FALLBACK_MIME: &str = "image/png";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    Image {
        mime_type: String,
        data_base64: String,
        alt_label: Option<String>,
    },
}

impl ContentPart {
    pub fn text(s: impl Into<String>) -> Self {
        ContentPart::Text(s.into())
    }

    pub fn is_image(&self) -> bool {
        matches!(self, ContentPart::Image { .. })
    }
}

/// One chat turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<ContentPart>,
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![ContentPart::text(text)],
        }
    }

    pub fn image_count(&self) -> usize {
        self.parts.iter().filter(|p| p.is_image()).count()
    }
}

/// Separator text placed before the image of page `page` (1-indexed).
pub fn page_separator(page: usize) -> String {
    format!("\n\n--- Page {page} ---\n\n")
}

/// Build a user message from a prompt and ordered page images.
///
/// Part order is `prompt?, image₁, sep₂?, image₂, …, imageₙ`. The prompt part
/// is omitted when blank. A separator goes between consecutive images only
/// when `add_page_separators` is set; the first image is implicitly page 1,
/// so the separator after image `i` (0-indexed) names page `i + 2`.
pub fn build_user_message<S: AsRef<str>>(
    prompt: &str,
    images: &[S],
    add_page_separators: bool,
) -> Message {
    let mut parts = Vec::with_capacity(images.len() * 2 + 1);

    if !prompt.trim().is_empty() {
        parts.push(ContentPart::text(prompt));
    }

    for (index, data_url) in images.iter().enumerate() {
        let (mime_type, data_base64) = split_data_url(data_url.as_ref());
        parts.push(ContentPart::Image {
            mime_type,
            data_base64,
            alt_label: None,
        });
        if add_page_separators && index + 1 < images.len() {
            parts.push(ContentPart::Text(page_separator(index + 2)));
        }
    }

    Message {
        role: Role::User,
        parts,
    }
}

static RE_DATA_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^data:([^;]+);base64,(.*)$").expect("valid data-url regex"));

static RE_IMAGE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^data:image/[^;]+;base64,").expect("valid image-prefix regex"));

/// Split a data URL into `(mime_type, base64_payload)`.
///
/// Attempts, in order:
/// 1. the generic `data:<mime>;base64,<data>` pattern
/// 2. each known supported image prefix
/// 3. stripping any `data:image/*;base64,` header
///
/// Whatever is left after the last attempt is the payload, and the MIME type
/// defaults to `image/png`. Never fails.
pub fn split_data_url(data_url: &str) -> (String, String) {
    if let Some(caps) = RE_DATA_URL.captures(data_url) {
        return (caps[1].to_string(), caps[2].to_string());
    }

    for mime in SUPPORTED_IMAGE_TYPES {
        let prefix = format!("data:{mime};base64,");
        if let Some(rest) = data_url.strip_prefix(prefix.as_str()) {
            return (mime.to_string(), rest.to_string());
        }
    }

    let stripped = RE_IMAGE_PREFIX.replace(data_url, "");
    (FALLBACK_MIME.to_string(), stripped.into_owned())
}

/// Inverse of [`split_data_url`] for well-formed input.
pub fn build_data_url(mime_type: &str, data_base64: &str) -> String {
    format!("data:{mime_type};base64,{data_base64}")
}

// ── Anthropic Messages API ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicBlock {
    Text { text: String },
    Image { source: AnthropicImageSource },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnthropicImageSource {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub media_type: String,
    pub data: String,
}

/// `content` array for one Anthropic message. Images carry bare base64.
pub fn to_anthropic_content(message: &Message) -> Vec<AnthropicBlock> {
    message
        .parts
        .iter()
        .map(|part| match part {
            ContentPart::Text(text) => AnthropicBlock::Text { text: text.clone() },
            ContentPart::Image {
                mime_type,
                data_base64,
                ..
            } => AnthropicBlock::Image {
                source: AnthropicImageSource {
                    kind: "base64",
                    media_type: mime_type.clone(),
                    data: data_base64.clone(),
                },
            },
        })
        .collect()
}

// ── OpenAI-compatible chat API ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpenAiPart {
    Text { text: String },
    ImageUrl { image_url: OpenAiImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenAiImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenAiMessage {
    pub role: Role,
    pub content: Vec<OpenAiPart>,
}

/// OpenAI chat message. Images are sent as full data URLs, not bare base64.
pub fn to_openai_message(message: &Message) -> OpenAiMessage {
    let content = message
        .parts
        .iter()
        .map(|part| match part {
            ContentPart::Text(text) => OpenAiPart::Text { text: text.clone() },
            ContentPart::Image {
                mime_type,
                data_base64,
                ..
            } => OpenAiPart::ImageUrl {
                image_url: OpenAiImageUrl {
                    url: build_data_url(mime_type, data_base64),
                },
            },
        })
        .collect();
    OpenAiMessage {
        role: message.role,
        content,
    }
}

// ── Ollama generate API ──────────────────────────────────────────────────

/// Flattened prompt and bare-base64 images for `/api/generate`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OllamaPromptImages {
    pub prompt: String,
    pub images: Vec<String>,
}

/// Text parts joined with newlines; image payloads in order.
pub fn to_ollama_prompt_and_images(messages: &[Message]) -> OllamaPromptImages {
    let mut text_chunks: Vec<&str> = Vec::new();
    let mut images = Vec::new();
    for part in messages.iter().flat_map(|m| m.parts.iter()) {
        match part {
            ContentPart::Text(text) => text_chunks.push(text),
            ContentPart::Image { data_base64, .. } => images.push(data_base64.clone()),
        }
    }
    OllamaPromptImages {
        prompt: text_chunks.join("\n"),
        images,
    }
}
