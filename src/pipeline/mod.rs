//! Collaborator plumbing shared by the extraction and synthesis stages.
//!
//! Each submodule does exactly one thing, so each can be tested on its own
//! and swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! general:  input ──▶ pdf::extract_text ───────────────▶ llm ──▶ response
//! thermal:  input ──▶ pdf::render_pages ──▶ encode ────▶ llm ──▶ response
//!          (URL/path)   (pdfium, blocking)   (base64 PNG)  (model) (JSON)
//! ```
//!
//! 1. [`input`]    — canonicalise a path or URL to a local PDF
//! 2. [`pdf`]      — bind pdfium, read page text, rasterise pages; all work
//!    runs in `spawn_blocking`
//! 3. [`encode`]   — PNG-encode and base64-wrap each rendered page
//! 4. [`llm`]      — the [`llm::ReasoningCapability`] contract and the
//!    schema-gated [`llm::request_structured`] call
//! 5. [`response`] — transport cleanup of the model's reply before parsing

pub mod encode;
pub mod input;
pub mod llm;
pub mod pdf;
pub mod response;
