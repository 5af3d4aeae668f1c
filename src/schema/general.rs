//! Entities extracted from the text-based general inspection report.

use super::{
    area_key, field_path, grounded_text, index_path, required_text, TargetSchema, Validate,
    Violation, NOT_AVAILABLE,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity stated by the general report for one observation.
///
/// Ordered so that `max()` over a set of observations yields the most severe
/// stated value, and `NotAvailable` only when nothing was stated.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[serde(rename = "Not Available")]
    NotAvailable,
    Informational,
    Minor,
    Moderate,
    Severe,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::NotAvailable => NOT_AVAILABLE,
            Severity::Informational => "informational",
            Severity::Minor => "minor",
            Severity::Moderate => "moderate",
            Severity::Severe => "severe",
        }
    }

    pub fn is_stated(&self) -> bool {
        *self != Severity::NotAvailable
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How well an observation is anchored in the report text.
///
/// Derived by the extractor after validation; a model-supplied value is an
/// unknown field and rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// The area label occurs in the text and a severity is stated.
    High,
    /// The area label occurs in the text, severity is not stated.
    Medium,
    /// The area label does not occur verbatim in the text.
    Low,
}

impl Confidence {
    pub fn derive(area: &str, severity: Severity, source: &GroundingText) -> Self {
        if !source.mentions(area) {
            Confidence::Low
        } else if severity.is_stated() {
            Confidence::High
        } else {
            Confidence::Medium
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

/// The general report text, normalised once for label look-ups.
#[derive(Debug, Clone)]
pub struct GroundingText(String);

impl GroundingText {
    pub fn new(text: &str) -> Self {
        Self(area_key(text))
    }

    /// True when `label` occurs in the text (case and whitespace insensitive).
    pub fn mentions(&self, label: &str) -> bool {
        let key = area_key(label);
        !key.is_empty() && self.0.contains(&key)
    }
}

/// One finding from the general inspection report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub area: String,
    pub description: String,
    pub severity: Severity,
    /// Cause stated by the report text, or the sentinel.
    pub stated_cause: String,
    pub confidence: Confidence,
}

/// One observation as the model reports it.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[schemars(rename = "Observation")]
pub struct ObservationWire {
    /// Room or location exactly as named in the report, e.g. 'Master Bedroom'
    #[schemars(length(min = 1))]
    area: String,
    /// What the report says is wrong or was observed in this area
    #[schemars(length(min = 1))]
    description: String,
    /// Only if the report states it; otherwise 'Not Available'
    severity: Severity,
    /// Cause the report explicitly states; otherwise 'Not Available'
    #[schemars(length(min = 1))]
    stated_cause: String,
}

impl Validate for Observation {
    const ENTITY: &'static str = "Observation";
    type Context = GroundingText;
    type Wire = ObservationWire;

    fn from_wire(
        wire: ObservationWire,
        path: &str,
        ctx: &GroundingText,
        out: &mut Vec<Violation>,
    ) -> Option<Self> {
        let area = required_text(&wire.area, &field_path(path, "area"), out);
        let description = required_text(&wire.description, &field_path(path, "description"), out);
        let stated_cause = grounded_text(&wire.stated_cause, &field_path(path, "stated_cause"), out);

        let (area, description, stated_cause) = (area?, description?, stated_cause?);
        let confidence = Confidence::derive(&area, wire.severity, ctx);
        Some(Observation {
            area,
            description,
            severity: wire.severity,
            stated_cause,
            confidence,
        })
    }
}

/// Document-level metadata; each field independently falls back to the sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct ReportMetadata {
    /// Street address of the inspected property; omit when not stated
    #[schemars(length(min = 1))]
    pub property_address: String,
    /// Date of the inspection as printed; omit when not stated
    #[schemars(length(min = 1))]
    pub inspection_date: String,
}

impl Default for ReportMetadata {
    fn default() -> Self {
        Self {
            property_address: NOT_AVAILABLE.to_string(),
            inspection_date: NOT_AVAILABLE.to_string(),
        }
    }
}

impl Validate for ReportMetadata {
    const ENTITY: &'static str = "ReportMetadata";
    type Context = ();
    type Wire = ReportMetadata;

    fn from_wire(wire: ReportMetadata, path: &str, _: &(), out: &mut Vec<Violation>) -> Option<Self> {
        let property_address =
            grounded_text(&wire.property_address, &field_path(path, "property_address"), out);
        let inspection_date =
            grounded_text(&wire.inspection_date, &field_path(path, "inspection_date"), out);
        Some(ReportMetadata {
            property_address: property_address?,
            inspection_date: inspection_date?,
        })
    }
}

/// Everything the general report extractor produces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneralReportData {
    pub observations: Vec<Observation>,
    pub metadata: ReportMetadata,
}

/// The general extractor's reply.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[schemars(rename = "GeneralReportData")]
pub struct GeneralReportWire {
    /// One entry per area and finding in the report
    observations: Vec<ObservationWire>,
    #[serde(default)]
    metadata: ReportMetadata,
}

impl Validate for GeneralReportData {
    const ENTITY: &'static str = "GeneralReportData";
    type Context = GroundingText;
    type Wire = GeneralReportWire;

    fn from_wire(
        wire: GeneralReportWire,
        path: &str,
        ctx: &GroundingText,
        out: &mut Vec<Violation>,
    ) -> Option<Self> {
        let metadata = ReportMetadata::from_wire(wire.metadata, &field_path(path, "metadata"), &(), out);
        let base = field_path(path, "observations");
        let observations: Vec<Option<Observation>> = wire
            .observations
            .into_iter()
            .enumerate()
            .map(|(i, item)| Observation::from_wire(item, &index_path(&base, i), ctx, out))
            .collect();
        Some(GeneralReportData {
            observations: observations.into_iter().collect::<Option<Vec<_>>>()?,
            metadata: metadata?,
        })
    }
}

impl TargetSchema for GeneralReportData {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source() -> GroundingText {
        GroundingText::new(
            "123 Elm St. Kitchen ceiling: moisture staining observed, moderate. \
             Attic: no insulation issues found.",
        )
    }

    #[test]
    fn valid_report_passes_and_derives_confidence() {
        let raw = json!({
            "observations": [
                {"area": "Kitchen", "description": "Moisture staining on ceiling",
                 "severity": "moderate", "stated_cause": "Not Available"},
                {"area": "Attic", "description": "No insulation issues found",
                 "severity": "Not Available", "stated_cause": "not available"},
                {"area": "Garage", "description": "Cracked slab",
                 "severity": "minor", "stated_cause": "Not Available"}
            ],
            "metadata": {"property_address": "123 Elm St."}
        });
        let data = GeneralReportData::validate(&raw, &source()).expect("valid");
        assert_eq!(data.observations.len(), 3);
        assert_eq!(data.observations[0].severity, Severity::Moderate);
        assert_eq!(data.observations[0].confidence, Confidence::High);
        assert_eq!(data.observations[1].confidence, Confidence::Medium);
        assert_eq!(data.observations[1].stated_cause, NOT_AVAILABLE);
        assert_eq!(data.observations[2].confidence, Confidence::Low);
        assert_eq!(data.metadata.property_address, "123 Elm St.");
        assert_eq!(data.metadata.inspection_date, NOT_AVAILABLE);
    }

    #[test]
    fn missing_metadata_means_not_available() {
        let raw = json!({"observations": []});
        let data = GeneralReportData::validate(&raw, &source()).expect("valid");
        assert_eq!(data.metadata, ReportMetadata::default());
    }

    #[test]
    fn guessed_severity_scale_is_rejected() {
        let raw = json!({"observations": [
            {"area": "Kitchen", "description": "Stain", "severity": "High",
             "stated_cause": "Not Available"}
        ]});
        let err = GeneralReportData::validate(&raw, &source()).unwrap_err();
        assert_eq!(err.entity, "GeneralReportData");
        assert_eq!(err.violations[0].path, "$.observations[0].severity");
    }

    #[test]
    fn model_asserted_confidence_is_rejected() {
        let raw = json!({"observations": [
            {"area": "Kitchen", "description": "Stain", "severity": "minor",
             "stated_cause": "Not Available", "confidence": "high"}
        ]});
        let err = GeneralReportData::validate(&raw, &source()).unwrap_err();
        assert_eq!(err.violations[0].path, "$.observations[0].confidence");
        assert_eq!(err.violations[0].message, "unknown field");
    }

    #[test]
    fn every_structural_violation_is_reported() {
        let raw = json!({"observations": [
            {"area": "", "description": "Stain", "severity": "minor", "stated_cause": "Not Available"},
            {"area": "Attic", "description": null, "severity": "minor", "stated_cause": "Not Available"}
        ], "metadata": {"inspection_date": null}});
        let err = GeneralReportData::validate(&raw, &source()).unwrap_err();
        let paths: Vec<_> = err.violations.iter().map(|v| v.path.as_str()).collect();
        assert!(paths.contains(&"$.observations[0].area"));
        assert!(paths.contains(&"$.observations[1].description"));
        assert!(paths.contains(&"$.metadata.inspection_date"));
    }

    #[test]
    fn every_semantic_violation_is_reported() {
        let raw = json!({"observations": [
            {"area": "Not Available", "description": "Stain", "severity": "minor",
             "stated_cause": "Not Available"},
            {"area": "Attic", "description": "  ", "severity": "minor",
             "stated_cause": "Not Available"}
        ]});
        let err = GeneralReportData::validate(&raw, &source()).unwrap_err();
        let paths: Vec<_> = err.violations.iter().map(|v| v.path.as_str()).collect();
        assert_eq!(paths, vec!["$.observations[0].area", "$.observations[1].description"]);
    }

    #[test]
    fn severity_is_matched_exactly() {
        let raw = json!({"observations": [
            {"area": "Kitchen", "description": "Stain", "severity": "Minor",
             "stated_cause": "Not Available"}
        ]});
        let err = GeneralReportData::validate(&raw, &source()).unwrap_err();
        assert_eq!(err.violations[0].path, "$.observations[0].severity");
    }

    #[test]
    fn schema_lists_severities_and_forbids_extra_keys() {
        let schema = GeneralReportData::json_schema().to_string();
        for word in ["informational", "minor", "moderate", "severe", NOT_AVAILABLE] {
            assert!(schema.contains(&format!("\"{word}\"")), "missing {word}");
        }
        assert!(schema.contains("\"additionalProperties\":false"));
        assert!(!schema.contains("confidence"));
    }

    #[test]
    fn severity_orders_by_gravity() {
        let worst = [Severity::Minor, Severity::NotAvailable, Severity::Severe]
            .into_iter()
            .max();
        assert_eq!(worst, Some(Severity::Severe));
        assert!(Severity::NotAvailable < Severity::Informational);
    }

    #[test]
    fn observations_must_be_an_array() {
        let raw = json!({"observations": {"area": "Kitchen"}});
        let err = GeneralReportData::validate(&raw, &source()).unwrap_err();
        assert_eq!(err.violations[0].path, "$.observations");
        assert!(err.violations[0].message.contains("array"));
    }

    #[test]
    fn null_metadata_field_names_the_sentinel() {
        let raw = json!({"observations": [], "metadata": {"property_address": null}});
        let err = GeneralReportData::validate(&raw, &source()).unwrap_err();
        assert_eq!(err.violations[0].path, "$.metadata.property_address");
        assert!(err.violations[0].message.contains(NOT_AVAILABLE));
    }
}
