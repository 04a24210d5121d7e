//! Source ingestion: PDF bytes for the rasteriser, image files as data URLs.
//!
//! ## Why check the magic bytes?
//!
//! A `.pdf` that is really an HTML error page or a zero-byte placeholder
//! would otherwise reach `pdftoppm` and fail with an opaque exit code. The
//! `%PDF` check turns that into a clear [`Pdf2MdError::NotAPdf`].

use tracing::debug;

use super::encode::{fit_width, image_data_url, IMAGE_EXTENSIONS};
use super::store::{extension, DocumentStore};
use crate::error::Pdf2MdError;

/// True for paths ending in `.pdf` (any case).
pub fn is_pdf_path(path: &str) -> bool {
    extension(path).eq_ignore_ascii_case("pdf")
}

/// True for paths with one of the supported image extensions.
pub fn is_image_path(path: &str) -> bool {
    let ext = extension(path).to_ascii_lowercase();
    IMAGE_EXTENSIONS.contains(&ext.as_str())
}

/// Fail with [`Pdf2MdError::NotAPdf`] unless `bytes` start with `%PDF`.
pub fn ensure_pdf(path: &str, bytes: &[u8]) -> Result<(), Pdf2MdError> {
    if bytes.starts_with(b"%PDF") {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    for (dst, src) in magic.iter_mut().zip(bytes) {
        *dst = *src;
    }
    Err(Pdf2MdError::NotAPdf {
        path: path.to_string(),
        magic,
    })
}

/// Read a PDF from the store and validate it.
pub async fn load_pdf(store: &dyn DocumentStore, path: &str) -> Result<Vec<u8>, Pdf2MdError> {
    let bytes = store.read_bytes(path).await?;
    ensure_pdf(path, &bytes)?;
    debug!("Loaded PDF '{}' ({} bytes)", path, bytes.len());
    Ok(bytes)
}

/// Read image files in the given order and turn each into a data URL.
///
/// Images wider than `max_width` are downscaled first; decoding and
/// re-encoding run on the blocking pool.
pub async fn load_images(
    store: &dyn DocumentStore,
    paths: &[String],
    max_width: u32,
) -> Result<Vec<String>, Pdf2MdError> {
    let mut urls = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = store.read_bytes(path).await?;
        let original_len = bytes.len();
        let bytes = tokio::task::spawn_blocking(move || fit_width(bytes, max_width))
            .await
            .map_err(|e| Pdf2MdError::Internal(format!("Image task panicked: {}", e)))?;
        debug!("Converted '{}' ({} bytes) to data URL", path, original_len);
        urls.push(image_data_url(extension(path), &bytes));
    }
    Ok(urls)
}
