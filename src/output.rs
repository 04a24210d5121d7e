//! Result types returned by the conversion entry points.

use serde::Serialize;

/// One chunk's text, tagged with its 0-based position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkResult {
    pub chunk_index: usize,
    pub text: String,
}

/// Concatenate chunk outputs in `chunk_index` order.
///
/// Every chunk, a lone one included, is preceded by an HTML comment
/// `<!-- chunk:i/n -->` where `n` is the planned chunk count.
pub fn join_chunks(results: &[ChunkResult], total: usize) -> String {
    let mut ordered: Vec<&ChunkResult> = results.iter().collect();
    ordered.sort_by_key(|r| r.chunk_index);

    ordered
        .iter()
        .map(|r| format!("<!-- chunk:{}/{} -->\n{}", r.chunk_index + 1, total, r.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// What happened to the output note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum WriteOutcome {
    Created,
    /// An existing note was replaced after confirmation.
    Overwritten,
    /// The note existed and the caller declined to replace it.
    Skipped,
}

/// Per-run counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConversionStats {
    pub page_count: usize,
    /// Refinement passes whose output replaced the current text.
    pub refinement_passes_applied: usize,
    pub template_applied: bool,
    pub processing_time_ms: u64,
}

/// The complete result of converting one source document.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutput {
    /// Final Markdown, after refinement and post-processing.
    pub markdown: String,
    /// Store-relative path of the note.
    pub output_path: String,
    pub write: WriteOutcome,
    /// Where the source ended up, when the move step ran and succeeded.
    pub moved_to: Option<String>,
    pub stats: ConversionStats,
}
