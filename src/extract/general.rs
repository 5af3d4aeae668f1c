//! General-report extractor: inspection text → [`GeneralReportData`].

use crate::config::DdrConfig;
use crate::error::{DdrError, SourceError, Stage};
use crate::output::CallUsage;
use crate::pipeline::llm::{request_structured, Grounding, ReasoningCapability, ReasoningRequest};
use crate::prompts::{general_prompt, GENERAL_INSTRUCTIONS};
use crate::schema::general::GroundingText;
use crate::schema::GeneralReportData;
use tracing::{info, warn};

/// Structure the observations stated in `text`.
///
/// Confidence is derived from `text` after validation; see
/// [`crate::schema::Confidence`].
pub async fn extract_general(
    capability: &dyn ReasoningCapability,
    text: &str,
    config: &DdrConfig,
) -> Result<(GeneralReportData, CallUsage), DdrError> {
    if text.trim().is_empty() {
        return Err(DdrError::extraction(
            Stage::GeneralExtraction,
            SourceError::NoUsableContent("general report text is empty".into()),
        ));
    }

    let request = ReasoningRequest {
        stage: Stage::GeneralExtraction,
        instructions: GENERAL_INSTRUCTIONS.to_string(),
        prompt: general_prompt(),
        grounding: Grounding::Text(text.to_string()),
        temperature: config.extraction_temperature,
        max_tokens: config.max_tokens,
    };

    let grounding = GroundingText::new(text);
    let (data, usage) =
        request_structured::<GeneralReportData>(capability, &request, &grounding).await?;

    if data.observations.is_empty() {
        warn!("General report yielded no observations");
    }
    info!(
        "General report: {} observation(s)",
        data.observations.len()
    );
    Ok((data, usage))
}
