//! Post-processing and output naming.
//!
//! Once the provider has produced Markdown the note is wrapped in the
//! configured template, optionally gets an embed of its source appended,
//! and is given a file name inside the store.
//!
//! ## Why substitute `{{content}}` last?
//!
//! Generated Markdown routinely contains `{{...}}` sequences (templating
//! docs, LaTeX, code). Expanding the date placeholders inside the template
//! first and inserting the content afterwards keeps the content verbatim.
//!
//! ## Naming
//!
//! ```text
//! filename_pattern ──▶ generate_filename ──▶ sanitize_file_name ──▶ "<folder>/<name>.md"
//!                                                                     │ exists?
//!                                                                     ▼
//!                                                       find_free_path: "<name> 1.md", ...
//! ```

use chrono::{DateTime, Local, SecondsFormat};
use once_cell::sync::Lazy;
use regex::Regex;

use super::store::{extension, file_stem, join_path, split_path, DocumentStore};
use crate::config::Settings;
use crate::error::Pdf2MdError;

pub const CONTENT_PLACEHOLDER: &str = "{{content}}";

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

// ── Template ─────────────────────────────────────────────────────────────

/// Wrap `content` in `template`.
///
/// `{{date}}`, `{{datetime}}` and `{{time}}` are expanded from `now`. A
/// template without `{{content}}` would silently drop the note, so it is
/// rejected; the caller keeps the un-templated text.
pub fn apply_template(
    template: &str,
    content: &str,
    now: DateTime<Local>,
) -> Result<String, Pdf2MdError> {
    if !template.contains(CONTENT_PLACEHOLDER) {
        return Err(Pdf2MdError::InvalidConfig(format!(
            "post-processing template has no {CONTENT_PLACEHOLDER} placeholder"
        )));
    }
    let expanded = template
        .replace("{{datetime}}", &now.to_rfc3339_opts(SecondsFormat::Secs, false))
        .replace("{{date}}", &now.format(DATE_FORMAT).to_string())
        .replace("{{time}}", &now.format(TIME_FORMAT).to_string());
    Ok(expanded.replace(CONTENT_PLACEHOLDER, content))
}

/// Append an embed link to the source file.
pub fn append_embed(markdown: &str, source_path: &str) -> String {
    let (_, name) = split_path(source_path);
    format!("{markdown}\n\n![[{name}]]")
}

// ── File naming ──────────────────────────────────────────────────────────

static FORBIDDEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\\/:*?"<>|]"#).expect("valid forbidden-chars regex"));
static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Expand `{{basename}}` and `{{date}}` in the file-name pattern.
pub fn generate_filename(pattern: &str, basename: &str, now: DateTime<Local>) -> String {
    let pattern = if pattern.trim().is_empty() {
        "{{basename}}"
    } else {
        pattern
    };
    pattern
        .replace("{{basename}}", basename)
        .replace("{{date}}", &now.format(DATE_FORMAT).to_string())
}

/// Make `name` safe as a single path component.
pub fn sanitize_file_name(name: &str) -> String {
    let replaced = FORBIDDEN.replace_all(name, "-");
    let collapsed = WHITESPACE.replace_all(&replaced, " ");
    let trimmed = collapsed.trim().trim_matches('.').trim();
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Store path of the note for `source_path`: the configured output folder,
/// or the source's own folder when none is set.
pub fn output_path(settings: &Settings, source_path: &str, now: DateTime<Local>) -> String {
    let basename = file_stem(source_path);
    let name = sanitize_file_name(&generate_filename(&settings.filename_pattern, basename, now));
    let folder = if settings.output_folder.trim().is_empty() {
        split_path(source_path).0
    } else {
        settings.output_folder.as_str()
    };
    join_path(folder, &format!("{name}.md"))
}

/// `"Notes/a 2.md"` for `("Notes/a.md", 2)`.
pub fn suffixed_path(path: &str, n: u32) -> String {
    let (folder, _) = split_path(path);
    let stem = file_stem(path);
    let name = match extension(path) {
        "" => format!("{stem} {n}"),
        ext => format!("{stem} {n}.{ext}"),
    };
    join_path(folder, &name)
}

/// `path` when free, otherwise the first free `" N"`-suffixed variant.
pub async fn find_free_path(store: &dyn DocumentStore, path: &str) -> String {
    if !store.exists(path).await {
        return path.to_string();
    }
    let mut n = 1;
    loop {
        let candidate = suffixed_path(path, n);
        if !store.exists(&candidate).await {
            return candidate;
        }
        n += 1;
    }
}

/// Destination of a processed source inside `processed_folder`.
pub fn processed_destination(processed_folder: &str, source_path: &str) -> String {
    let (_, name) = split_path(source_path);
    join_path(processed_folder, name)
}
