//! Pipeline stages around the AI call.
//!
//! ## Data Flow
//!
//! ```text
//! store ──▶ input ──▶ encode ──▶ (provider) ──▶ postprocess ──▶ store
//! (bytes)   (checks)  (data URLs)               (template, naming)
//! ```
//!
//! 1. [`store`]  the host document store and store-path helpers
//! 2. [`input`]  PDF magic check, image-file ingestion with downscaling
//! 3. [`encode`] data URL building and decoding, MIME detection, resizing;
//!    CPU-bound work runs in `spawn_blocking`
//! 4. [`postprocess`] template substitution, source embed, output naming
//!    and collision suffixes

pub mod encode;
pub mod input;
pub mod postprocess;
pub mod store;
