//! Name- and text-based guesses about backend capabilities.
//!
//! None of these are protocol: model names and error strings are matched by
//! substring. Every known signature lives in this file so a new model family
//! is a one-line addition.

use once_cell::sync::Lazy;
use regex::Regex;

/// Substrings of model names known to accept image input.
pub const VISION_MODEL_MARKERS: &[&str] = &[
    "llava",
    "bakllava",
    "moondream",
    "qwenvl",
    "qwen-vl",
    "minicpm",
    "yi-vl",
    "phi-3-vision",
];

/// Strict check used for local-inference model names.
pub fn is_vision_model(model: &str) -> bool {
    let name = model.to_lowercase();
    VISION_MODEL_MARKERS.iter().any(|m| name.contains(m))
}

static RE_LOOSE_VISION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)vision|vl|llava|moondream|bakllava|qwen[- ]?vl|qwenvl|minicpm|yi[- ]?vl|phi-3-vision")
        .expect("valid vision regex")
});

/// Looser check for model lists that mix naming schemes (LM Studio).
pub fn is_vision_model_loose(model: &str) -> bool {
    RE_LOOSE_VISION.is_match(model)
}

/// Error text that means "this model cannot take images".
pub fn is_vision_unsupported_error(text: &str) -> bool {
    let msg = text.to_lowercase();
    msg.contains("image")
        && (msg.contains("unsupported") || msg.contains("not support") || msg.contains("vision"))
}

/// Error text that means the backend is not running.
pub fn is_connection_refused(text: &str) -> bool {
    let msg = text.to_lowercase();
    msg.contains("err_connection_refused")
        || msg.contains("connection refused")
        || msg.contains("econnrefused")
}

/// Error text that means the requested model is not installed.
pub fn is_model_not_found(text: &str) -> bool {
    let msg = text.to_lowercase();
    msg.contains("not found") && msg.contains("model")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vision_families() {
        for name in [
            "llava:13b",
            "bakllava",
            "moondream2",
            "qwen-vl-chat",
            "QwenVL",
            "minicpm-v",
            "yi-vl-6b",
            "phi-3-vision-128k",
        ] {
            assert!(is_vision_model(name), "{name}");
        }
        assert!(!is_vision_model("llama3:8b"));
        assert!(!is_vision_model("mistral"));
    }

    #[test]
    fn loose_matches_more_names() {
        assert!(is_vision_model_loose("qwen2-vl-7b-instruct"));
        assert!(is_vision_model_loose("Llama-3.2-Vision"));
        assert!(!is_vision_model_loose("mistral-7b-instruct"));
    }

    #[test]
    fn vision_error_signatures() {
        assert!(is_vision_unsupported_error(
            "HTTP 500: {\"error\":\"model does not support image input\"}"
        ));
        assert!(is_vision_unsupported_error("Image input unsupported"));
        assert!(is_vision_unsupported_error("this model lacks vision; image ignored"));
        assert!(!is_vision_unsupported_error("HTTP 500: out of memory"));
        assert!(!is_vision_unsupported_error("vision server timeout"));
    }

    #[test]
    fn refused_and_not_found() {
        assert!(is_connection_refused("net::ERR_CONNECTION_REFUSED"));
        assert!(is_connection_refused("tcp connect error: Connection refused (os error 111)"));
        assert!(!is_connection_refused("timed out"));
        assert!(is_model_not_found("{\"error\":\"model 'llava' not found\"}"));
        assert!(!is_model_not_found("file not found"));
    }
}
