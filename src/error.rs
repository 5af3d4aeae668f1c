//! Error types for the edgequake-ddr library.
//!
//! Every pipeline failure is fatal: a diagnostic report is either produced
//! from fully validated data or not produced at all. [`DdrError`] therefore
//! carries the [`Stage`] that failed so the CLI can print a stage-tagged
//! message, and the four core kinds map one-to-one onto the ways a stage can
//! fail:
//!
//! * [`DdrError::ExtractionFailure`] — a source document could not be read or
//!   held nothing usable (details in [`SourceError`]).
//! * [`DdrError::SchemaViolation`] — a reasoning call answered with data that
//!   does not conform to the entity schema (details in
//!   [`crate::schema::SchemaError`]).
//! * [`DdrError::SynthesisFailure`] — the reconciliation answer was well-formed
//!   but could not be merged into a complete report.
//! * [`DdrError::TransportFailure`] — the reasoning provider errored or timed out.

use crate::schema::SchemaError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The pipeline component an error (or progress event) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    /// Reading the general report and structuring its observations.
    GeneralExtraction,
    /// Rasterising the thermal report and structuring its anomalies.
    ThermalExtraction,
    /// Reconciling both structured reports into one DDR.
    Synthesis,
    /// Rendering the DDR to its presentation format.
    Formatting,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::GeneralExtraction => "general-extraction",
            Stage::ThermalExtraction => "thermal-extraction",
            Stage::Synthesis => "synthesis",
            Stage::Formatting => "formatting",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All errors returned by the edgequake-ddr library.
#[derive(Debug, Error)]
pub enum DdrError {
    // ── Core pipeline errors ──────────────────────────────────────────────
    /// The source document for `stage` could not be read or was empty.
    #[error("[{stage}] extraction failed: {source}")]
    ExtractionFailure {
        stage: Stage,
        #[source]
        source: SourceError,
    },

    /// A reasoning call returned data that violates the required schema.
    #[error("[{stage}] schema violation: {source}")]
    SchemaViolation {
        stage: Stage,
        #[source]
        source: SchemaError,
    },

    /// The reconciliation answer could not be merged into a complete report.
    #[error("[synthesis] could not produce a valid merged report: {detail}")]
    SynthesisFailure { detail: String },

    /// The reasoning provider was unreachable, errored, or timed out.
    #[error("[{stage}] reasoning call failed: {detail}")]
    TransportFailure { stage: Stage, detail: String },

    // ── Provider errors ───────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output report file.
    #[error("Failed to write report file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium, place the library next to the `ddr`\n\
binary, or install it in a system library directory.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DdrError {
    /// The pipeline stage this error is attributed to, when there is one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            DdrError::ExtractionFailure { stage, .. }
            | DdrError::SchemaViolation { stage, .. }
            | DdrError::TransportFailure { stage, .. } => Some(*stage),
            DdrError::SynthesisFailure { .. } => Some(Stage::Synthesis),
            _ => None,
        }
    }

    pub fn is_schema_violation(&self) -> bool {
        matches!(self, DdrError::SchemaViolation { .. })
    }

    pub(crate) fn extraction(stage: Stage, source: SourceError) -> Self {
        DdrError::ExtractionFailure { stage, source }
    }
}

/// Why a source document could not be turned into usable content.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Input file was not found at the given path.
    #[error("file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("'{path}' is not a PDF (first bytes: {magic:?})")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// HTTP URL was syntactically valid but download failed.
    #[error("failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("download of '{url}' timed out after {secs}s")]
    DownloadTimeout { url: String, secs: u64 },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted; provide --password")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// A page could not be read or rasterised.
    #[error("page {page}: {detail}")]
    PageFailed { page: usize, detail: String },

    /// Page selection matched none of the document's pages.
    #[error("page selection matches no pages (document has {total} pages)")]
    NoPagesSelected { total: usize },

    /// The document was read but contained nothing to ground an extraction in.
    #[error("no usable content: {0}")]
    NoUsableContent(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Violation;

    #[test]
    fn extraction_failure_is_stage_tagged() {
        let e = DdrError::extraction(
            Stage::GeneralExtraction,
            SourceError::FileNotFound {
                path: PathBuf::from("general.pdf"),
            },
        );
        let msg = e.to_string();
        assert!(msg.starts_with("[general-extraction]"), "got: {msg}");
        assert!(msg.contains("general.pdf"), "got: {msg}");
        assert_eq!(e.stage(), Some(Stage::GeneralExtraction));
    }

    #[test]
    fn schema_violation_display_lists_paths() {
        let e = DdrError::SchemaViolation {
            stage: Stage::ThermalExtraction,
            source: SchemaError::new(
                "ThermalReportData",
                vec![Violation::new("$.anomalies[0].visual_cue", "must not be empty")],
            ),
        };
        let msg = e.to_string();
        assert!(msg.contains("[thermal-extraction]"), "got: {msg}");
        assert!(msg.contains("$.anomalies[0].visual_cue"), "got: {msg}");
        assert!(e.is_schema_violation());
    }

    #[test]
    fn synthesis_failure_belongs_to_synthesis_stage() {
        let e = DdrError::SynthesisFailure {
            detail: "area 'attic' missing".into(),
        };
        assert_eq!(e.stage(), Some(Stage::Synthesis));
        assert!(e.to_string().contains("attic"));
    }

    #[test]
    fn transport_failure_display() {
        let e = DdrError::TransportFailure {
            stage: Stage::Synthesis,
            detail: "timed out after 120s".into(),
        };
        assert!(e.to_string().contains("[synthesis]"));
        assert!(e.to_string().contains("120s"));
    }

    #[test]
    fn config_errors_have_no_stage() {
        assert_eq!(DdrError::InvalidConfig("x".into()).stage(), None);
    }
}
