//! Built-in prompts and templates.
//!
//! Every prompt the core sends on its own initiative lives here so wording
//! changes touch one file. The host normally supplies its own extraction
//! prompt through [`crate::config::Settings::current_prompt`]; these are the
//! defaults.

/// Default prompt sent with the page images.
pub const DEFAULT_EXTRACTION_PROMPT: &str = r#"You are converting scanned or rendered document pages into a Markdown note.

Follow these rules precisely:

1. TEXT
   - Transcribe ALL text, in the order a human would read it
   - Keep handwriting as written; mark illegible words as [illegible]

2. STRUCTURE
   - Use # for the document title, ## and ### for sections
   - Use - for bullet lists and 1. 2. 3. for numbered lists
   - Convert tables to GFM pipe tables

3. FORMULAS
   - Use LaTeX: $inline$ and $$display$$

4. OUTPUT
   - Output ONLY the Markdown content
   - Do NOT wrap the answer in ```markdown fences
   - Do NOT add commentary"#;

/// Instruction prefixed to the current Markdown for refinement pass 2.
pub const PASS2_PROMPT: &str =
    "Clean and normalize the following Markdown. Only return the improved Markdown.\n\nInput:";

/// Instruction prefixed to the current Markdown for refinement pass 3.
pub const PASS3_PROMPT: &str =
    "Improve structure, headings, and tables. Only return the improved Markdown.\n\nInput:";

/// Default post-processing template.
pub const DEFAULT_TEMPLATE: &str = "---\ntags: [pdf2md, converted]\ndate: {{date}}\n---\n\n{{content}}";

/// Appended to the prompt when a local-inference chunk holds several pages.
pub const CONSECUTIVE_PAGES_HINT: &str =
    "The following images are consecutive pages for this document chunk. Preserve their order.";

/// One-token round trip used by diagnostics.
pub const TINY_TEST_PROMPT: &str = "Reply with exactly: OK";

/// Prompt with the multi-page hint appended when `pages > 1`.
pub fn chunk_prompt(prompt: &str, pages: usize) -> String {
    if pages > 1 {
        format!("{prompt}\n\n{CONSECUTIVE_PAGES_HINT}")
    } else {
        prompt.to_string()
    }
}

/// `prompt` followed by a blank line and `text`; the shape every text-only
/// request uses.
pub fn with_input(prompt: &str, text: &str) -> String {
    format!("{prompt}\n\n{text}")
}
