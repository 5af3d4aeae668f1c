//! Output types: the rendered report plus run statistics.

use crate::error::Stage;
use crate::schema::DdrReport;
use serde::Serialize;

/// Token usage and latency of one reasoning call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CallUsage {
    pub stage: Stage,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
}

/// Statistics for one diagnostic run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    /// One entry per reasoning call, in completion order of the stages.
    pub calls: Vec<CallUsage>,
    /// Characters of general report text sent to extraction.
    pub general_text_chars: usize,
    /// Thermal pages rasterised and sent as images.
    pub thermal_pages: usize,
    pub extraction_duration_ms: u64,
    pub synthesis_duration_ms: u64,
    pub total_duration_ms: u64,
}

impl RunStats {
    pub fn total_input_tokens(&self) -> usize {
        self.calls.iter().map(|c| c.input_tokens).sum()
    }

    pub fn total_output_tokens(&self) -> usize {
        self.calls.iter().map(|c| c.output_tokens).sum()
    }
}

/// The complete result of a diagnostic run.
#[derive(Debug, Clone, Serialize)]
pub struct DdrOutput {
    /// The client-facing Markdown document.
    pub markdown: String,
    /// The validated structured report the Markdown was rendered from.
    pub report: DdrReport,
    pub stats: RunStats,
}
