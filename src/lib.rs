//! # edgequake-ddr
//!
//! Merge a general inspection report and a thermal-imaging report into one
//! client-facing Detailed Diagnostic Report (DDR) using LLMs.
//!
//! ## Why this crate?
//!
//! Inspectors hand clients two documents that describe the same property in
//! different languages: a text report of what was seen, and a stack of
//! thermal images with temperature readings. Reading them side by side is
//! slow and easy to get wrong. This crate reads both, lines up the findings
//! per area, flags where the two sources disagree, and writes one report in
//! plain language. Nothing is invented: a fact that neither source states
//! comes out as `Not Available`.
//!
//! ## Pipeline Overview
//!
//! ```text
//! general PDF ─┐                                 thermal PDF ─┐
//!              ├─ 1. Input     path or URL                    ├─ 1. Input
//!              ├─ 2. Text      pdfium page text               ├─ 2. Render  pdfium → PNG
//!              └─ 3. Extract   one model call                 └─ 3. Extract one vision call
//!                        │                                              │
//!                        └──────────────┬───────────────────────────────┘
//!                                       ├─ 4. Synthesize  group by area + one reconciliation call
//!                                       └─ 5. Format      seven-section Markdown
//! ```
//!
//! Every model reply passes a schema gate before it is used. Any failure is
//! fatal and names its stage; there is no partial report.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_ddr::{diagnose, DdrConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = DdrConfig::default();
//!     let output = diagnose("inspection.pdf", "thermal.pdf", &config).await?;
//!     println!("{}", output.markdown);
//!     eprintln!("conflicts: {}", output.report.conflicts().count());
//!     Ok(())
//! }
//! ```
//!
//! ## Bring your own model
//!
//! Anything that implements [`ReasoningCapability`] can drive the pipeline,
//! which is how the tests run without network access:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use edgequake_ddr::{DdrConfig, ReasoningCapability};
//!
//! fn config_for(model: Arc<dyn ReasoningCapability>) -> DdrConfig {
//!     DdrConfig::builder()
//!         .capability(model)
//!         .alias("Loft", "Attic")
//!         .build()
//!         .expect("valid config")
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ddr` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-ddr = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod diagnose;
pub mod error;
pub mod extract;
pub mod format;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod schema;
pub mod synthesize;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{AreaAliases, DdrConfig, DdrConfigBuilder, PageSelection};
pub use diagnose::{
    diagnose, diagnose_sources, diagnose_sources_to_file, diagnose_sync, diagnose_to_file,
    write_atomic, DocumentSources,
};
pub use error::{DdrError, SourceError, Stage};
pub use extract::{extract_general, extract_thermal};
pub use format::{render_json, render_markdown};
pub use output::{CallUsage, DdrOutput, RunStats};
pub use pipeline::llm::{
    Grounding, LlmCapability, ReasoningCapability, ReasoningReply, ReasoningRequest,
    TransportError,
};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use schema::{
    Agreement, AreaVerdict, Confidence, DdrReport, GeneralReportData, Observation,
    Reconciliation, ReportMetadata, SchemaError, Severity, SynthesizedFinding, TemperatureDelta,
    ThermalAnomaly, ThermalReportData, Verdict, Violation, NOT_AVAILABLE,
};
pub use synthesize::synthesize;
