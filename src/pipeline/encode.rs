//! Image bytes ⇄ data URLs.
//!
//! Every page image travels through the core as a `data:<mime>;base64,…`
//! string. This module produces those strings from raw bytes and turns them
//! back into bytes when a page must be written to disk (OCR fallback).
//!
//! ## Why sniff content as well as the extension?
//!
//! Vault files are often misnamed (`scan.png` that is really a JPEG). The
//! backends reject an image whose declared media type does not match its
//! bytes, so the magic number wins whenever the `image` crate recognises it.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use tracing::debug;

use crate::error::Pdf2MdError;
use crate::message::split_data_url;

/// File extensions accepted by the image ingestion flow.
pub const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

/// `data:<mime>;base64,<payload>` for raw bytes.
pub fn to_data_url(bytes: &[u8], mime_type: &str) -> String {
    format!("data:{mime_type};base64,{}", STANDARD.encode(bytes))
}

/// MIME type by extension: `jpg`/`jpeg` and `webp` are recognised, anything
/// else is treated as PNG.
pub fn mime_from_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        _ => "image/png",
    }
}

/// MIME type from the magic number, for the three supported formats.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    match image::guess_format(bytes).ok()? {
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::WebP => Some("image/webp"),
        _ => None,
    }
}

/// Data URL for an image file's bytes, content sniffing first.
pub fn image_data_url(extension: &str, bytes: &[u8]) -> String {
    let mime = sniff_mime(bytes).unwrap_or_else(|| mime_from_extension(extension));
    to_data_url(bytes, mime)
}

/// Decode a data URL back into bytes plus the extension to save them under.
pub fn decode_data_url(data_url: &str) -> Result<(Vec<u8>, &'static str), Pdf2MdError> {
    let (mime, payload) = split_data_url(data_url);
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| Pdf2MdError::Internal(format!("invalid base64 image data: {e}")))?;
    let ext = match mime.as_str() {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        _ => "png",
    };
    Ok((bytes, ext))
}

/// Shrink an image wider than `max_width` and re-encode it as PNG.
///
/// Images already within bounds, and bytes the decoder does not understand,
/// are returned unchanged. CPU-bound; call through `spawn_blocking`.
pub fn fit_width(bytes: Vec<u8>, max_width: u32) -> Vec<u8> {
    let reader = match image::ImageReader::new(Cursor::new(&bytes)).with_guessed_format() {
        Ok(r) => r,
        Err(_) => return bytes,
    };
    match reader.into_dimensions() {
        Ok((w, _)) if max_width > 0 && w > max_width => {}
        _ => return bytes,
    }

    let img = match image::load_from_memory(&bytes) {
        Ok(img) => img,
        Err(_) => return bytes,
    };
    let (w, h) = (img.width(), img.height());
    let new_h = ((h as u64 * max_width as u64) / w as u64).max(1) as u32;
    let resized = img.resize(max_width, new_h, image::imageops::FilterType::Lanczos3);

    match encode_png(&resized) {
        Ok(png) => {
            debug!("Downscaled {}x{} → {}x{}", w, h, resized.width(), resized.height());
            png
        }
        Err(_) => bytes,
    }
}

/// Lossless PNG so text edges stay crisp for the vision model.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}
