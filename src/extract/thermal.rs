//! Thermal-report extractor: ordered page images → [`ThermalReportData`].

use crate::config::DdrConfig;
use crate::error::{DdrError, SourceError, Stage};
use crate::output::CallUsage;
use crate::pipeline::llm::{request_structured, Grounding, ReasoningCapability, ReasoningRequest};
use crate::prompts::{thermal_prompt, THERMAL_INSTRUCTIONS};
use crate::schema::ThermalReportData;
use edgequake_llm::ImageData;
use tracing::{info, warn};

/// Structure the anomalies visible on `pages`, sent in order in one call.
///
/// Every anomaly must cite a page within `1..=pages.len()`.
pub async fn extract_thermal(
    capability: &dyn ReasoningCapability,
    pages: Vec<ImageData>,
    config: &DdrConfig,
) -> Result<(ThermalReportData, CallUsage), DdrError> {
    if pages.is_empty() {
        return Err(DdrError::extraction(
            Stage::ThermalExtraction,
            SourceError::NoUsableContent("thermal report has no page images".into()),
        ));
    }

    let page_count = pages.len();
    let request = ReasoningRequest {
        stage: Stage::ThermalExtraction,
        instructions: THERMAL_INSTRUCTIONS.to_string(),
        prompt: thermal_prompt(page_count),
        grounding: Grounding::Images(pages),
        temperature: config.extraction_temperature,
        max_tokens: config.max_tokens,
    };

    let (data, usage) =
        request_structured::<ThermalReportData>(capability, &request, &page_count).await?;

    if data.anomalies.is_empty() {
        warn!("Thermal report yielded no anomalies across {} page(s)", page_count);
    }
    info!(
        "Thermal report: {} anomaly(ies) across {} page(s)",
        data.anomalies.len(),
        page_count
    );
    Ok((data, usage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::llm::{ReasoningReply, TransportError};
    use crate::schema::TemperatureDelta;
    use async_trait::async_trait;

    struct Fixed(&'static str);

    #[async_trait]
    impl ReasoningCapability for Fixed {
        async fn reason(&self, request: &ReasoningRequest) -> Result<ReasoningReply, TransportError> {
            match &request.grounding {
                Grounding::Images(images) if !images.is_empty() => Ok(ReasoningReply {
                    content: self.0.to_string(),
                    ..Default::default()
                }),
                _ => Err(TransportError("expected image grounding".into())),
            }
        }
    }

    fn pages(n: usize) -> Vec<ImageData> {
        (0..n)
            .map(|_| ImageData::new("iVBORw0KGgo=", "image/png"))
            .collect()
    }

    #[tokio::test]
    async fn no_pages_fails_without_a_call() {
        let err = extract_thermal(&Fixed("{}"), vec![], &DdrConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::ThermalExtraction));
        assert!(matches!(err, DdrError::ExtractionFailure { .. }));
    }

    #[tokio::test]
    async fn anomalies_are_validated() {
        let cap = Fixed(
            r#"```json
{"anomalies": [{"area": "Attic", "anomaly_type": "insulation gap",
  "temperature_delta": -6.5, "description": "Cold band along eaves",
  "visual_cue": "dark blue band at roof line", "page": 2,
  "stated_cause": "Not Available"}]}
```"#,
        );
        let (data, _) = extract_thermal(&cap, pages(2), &DdrConfig::default())
            .await
            .unwrap();
        assert_eq!(data.anomalies.len(), 1);
        assert_eq!(
            data.anomalies[0].temperature_delta,
            TemperatureDelta::Celsius(-6.5)
        );
    }

    #[tokio::test]
    async fn page_beyond_supplied_images_is_rejected() {
        let cap = Fixed(
            r#"{"anomalies": [{"area": "Attic", "anomaly_type": "insulation gap",
              "temperature_delta": "Not Available", "description": "Cold band",
              "visual_cue": "blue band", "page": 3, "stated_cause": "Not Available"}]}"#,
        );
        let err = extract_thermal(&cap, pages(2), &DdrConfig::default())
            .await
            .unwrap_err();
        assert!(err.is_schema_violation());
    }

    #[tokio::test]
    async fn missing_visual_cue_is_rejected() {
        let cap = Fixed(
            r#"{"anomalies": [{"area": "Attic", "anomaly_type": "insulation gap",
              "temperature_delta": -2, "description": "Cold band",
              "visual_cue": "", "page": 1, "stated_cause": "Not Available"}]}"#,
        );
        let err = extract_thermal(&cap, pages(1), &DdrConfig::default())
            .await
            .unwrap_err();
        match err {
            DdrError::SchemaViolation { source, .. } => {
                assert!(source
                    .violations
                    .iter()
                    .any(|v| v.path == "$.anomalies[0].visual_cue"));
            }
            other => panic!("unexpected: {other}"),
        }
    }
}
