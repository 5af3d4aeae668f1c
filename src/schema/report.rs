//! Synthesis-side entities: the reconciliation answer and the final DDR.

use super::{
    area_key, field_path, grounded_text, index_path, is_not_available, required_text, text_list,
    ReportMetadata, SchemaError, Severity, TargetSchema, Validate, Violation,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The reconciliation call's judgement for an area both reports cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Consistent,
    Complementary,
    Contradictory,
}

/// Which sources back a finding and how they relate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Agreement {
    GeneralOnly,
    ThermalOnly,
    Consistent,
    Complementary,
    Contradictory,
}

impl Agreement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Agreement::GeneralOnly => "general_only",
            Agreement::ThermalOnly => "thermal_only",
            Agreement::Consistent => "consistent",
            Agreement::Complementary => "complementary",
            Agreement::Contradictory => "contradictory",
        }
    }
}

impl From<Verdict> for Agreement {
    fn from(v: Verdict) -> Self {
        match v {
            Verdict::Consistent => Agreement::Consistent,
            Verdict::Complementary => Agreement::Complementary,
            Verdict::Contradictory => Agreement::Contradictory,
        }
    }
}

/// One area judged by the reconciliation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AreaVerdict {
    pub area: String,
    pub verdict: Verdict,
    pub combined_assessment: String,
    /// Non-empty exactly when `verdict` is contradictory.
    pub conflict_note: String,
}

/// One area verdict as the model writes it.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[schemars(rename = "AreaVerdict")]
pub struct AreaVerdictWire {
    /// Area name exactly as listed under AREAS TO RECONCILE
    #[schemars(length(min = 1))]
    area: String,
    verdict: Verdict,
    #[schemars(length(min = 1))]
    combined_assessment: String,
    /// Empty string unless verdict is 'contradictory'; then describe the disagreement
    conflict_note: String,
}

impl Validate for AreaVerdict {
    const ENTITY: &'static str = "AreaVerdict";
    type Context = ();
    type Wire = AreaVerdictWire;

    fn from_wire(wire: AreaVerdictWire, path: &str, _: &(), out: &mut Vec<Violation>) -> Option<Self> {
        let area = required_text(&wire.area, &field_path(path, "area"), out);
        let combined_assessment = required_text(
            &wire.combined_assessment,
            &field_path(path, "combined_assessment"),
            out,
        );
        let conflict_note = wire.conflict_note.trim().to_string();

        let contradictory = wire.verdict == Verdict::Contradictory;
        let has_note = !conflict_note.is_empty() && !is_not_available(&conflict_note);
        if contradictory && !has_note {
            out.push(Violation::new(
                field_path(path, "conflict_note"),
                "a contradictory verdict must describe the discrepancy",
            ));
            return None;
        }
        if !contradictory && !conflict_note.is_empty() {
            out.push(Violation::new(
                field_path(path, "conflict_note"),
                "must be empty unless the verdict is contradictory",
            ));
            return None;
        }
        Some(AreaVerdict {
            area: area?,
            verdict: wire.verdict,
            combined_assessment: combined_assessment?,
            conflict_note,
        })
    }
}

/// The synthesis reasoning call's answer.
///
/// Carries per-area verdicts for the areas both reports cover plus the
/// report-level narrative. It never carries root causes: those come only
/// from what the source reports state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub property_issue_summary: String,
    pub areas: Vec<AreaVerdict>,
    pub severity_assessment: String,
    pub recommended_actions: Vec<String>,
    pub additional_notes: String,
}

/// The reconciliation reply.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[schemars(rename = "Reconciliation")]
pub struct ReconciliationWire {
    /// 2-3 sentence client-friendly summary of the findings
    #[schemars(length(min = 1))]
    property_issue_summary: String,
    /// Exactly one entry per area listed under AREAS TO RECONCILE
    areas: Vec<AreaVerdictWire>,
    /// Overall severity with a one-sentence reason grounded in the findings
    #[schemars(length(min = 1))]
    severity_assessment: String,
    recommended_actions: Vec<String>,
    #[schemars(length(min = 1))]
    additional_notes: String,
}

impl Validate for Reconciliation {
    const ENTITY: &'static str = "Reconciliation";
    type Context = ();
    type Wire = ReconciliationWire;

    fn from_wire(wire: ReconciliationWire, path: &str, _: &(), out: &mut Vec<Violation>) -> Option<Self> {
        let property_issue_summary = grounded_text(
            &wire.property_issue_summary,
            &field_path(path, "property_issue_summary"),
            out,
        );
        let severity_assessment = grounded_text(
            &wire.severity_assessment,
            &field_path(path, "severity_assessment"),
            out,
        );
        let recommended_actions = text_list(
            &wire.recommended_actions,
            &field_path(path, "recommended_actions"),
            out,
        );
        let additional_notes =
            grounded_text(&wire.additional_notes, &field_path(path, "additional_notes"), out);
        let base = field_path(path, "areas");
        let areas: Vec<Option<AreaVerdict>> = wire
            .areas
            .into_iter()
            .enumerate()
            .map(|(i, item)| AreaVerdict::from_wire(item, &index_path(&base, i), &(), out))
            .collect();

        Some(Reconciliation {
            property_issue_summary: property_issue_summary?,
            areas: areas.into_iter().collect::<Option<Vec<_>>>()?,
            severity_assessment: severity_assessment?,
            recommended_actions: recommended_actions?,
            additional_notes: additional_notes?,
        })
    }
}

impl TargetSchema for Reconciliation {}

/// One merged, per-area result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SynthesizedFinding {
    #[schemars(length(min = 1))]
    pub area: String,
    #[schemars(length(min = 1))]
    pub general_summary: String,
    #[schemars(length(min = 1))]
    pub thermal_summary: String,
    #[schemars(length(min = 1))]
    pub combined_assessment: String,
    /// Highest severity stated by the general report for this area.
    pub severity: Severity,
    #[schemars(length(min = 1))]
    pub probable_root_cause: String,
    pub agreement: Agreement,
    pub conflict_flag: bool,
    pub conflict_note: String,
}

impl Validate for SynthesizedFinding {
    const ENTITY: &'static str = "SynthesizedFinding";
    type Context = ();
    type Wire = SynthesizedFinding;

    fn from_wire(wire: SynthesizedFinding, path: &str, _: &(), out: &mut Vec<Violation>) -> Option<Self> {
        let at = |key: &str| field_path(path, key);
        let finding = SynthesizedFinding {
            area: required_text(&wire.area, &at("area"), out)?,
            general_summary: grounded_text(&wire.general_summary, &at("general_summary"), out)?,
            thermal_summary: grounded_text(&wire.thermal_summary, &at("thermal_summary"), out)?,
            combined_assessment: required_text(
                &wire.combined_assessment,
                &at("combined_assessment"),
                out,
            )?,
            probable_root_cause: grounded_text(
                &wire.probable_root_cause,
                &at("probable_root_cause"),
                out,
            )?,
            ..wire
        };
        finding.check_invariants(path, out);
        Some(finding)
    }
}

impl SynthesizedFinding {
    fn check_invariants(&self, path: &str, out: &mut Vec<Violation>) {
        if self.conflict_flag != !self.conflict_note.is_empty() {
            out.push(Violation::new(
                field_path(path, "conflict_note"),
                "must be non-empty exactly when conflict_flag is true",
            ));
        }
        if self.conflict_flag != (self.agreement == Agreement::Contradictory) {
            out.push(Violation::new(
                field_path(path, "conflict_flag"),
                "must be true exactly when the sources contradict each other",
            ));
        }
        match self.agreement {
            Agreement::GeneralOnly if !is_not_available(&self.thermal_summary) => {
                out.push(Violation::new(
                    field_path(path, "thermal_summary"),
                    "general-only finding cannot carry a thermal summary",
                ));
            }
            Agreement::ThermalOnly if !is_not_available(&self.general_summary) => {
                out.push(Violation::new(
                    field_path(path, "general_summary"),
                    "thermal-only finding cannot carry a general summary",
                ));
            }
            Agreement::ThermalOnly if self.severity.is_stated() => {
                out.push(Violation::new(
                    field_path(path, "severity"),
                    "thermal-only finding has no stated severity",
                ));
            }
            _ => {}
        }
    }
}

/// The final structured Detailed Diagnostic Report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DdrReport {
    pub metadata: ReportMetadata,
    #[schemars(length(min = 1))]
    pub property_issue_summary: String,
    pub findings: Vec<SynthesizedFinding>,
    #[schemars(length(min = 1))]
    pub severity_assessment: String,
    pub recommended_actions: Vec<String>,
    #[schemars(length(min = 1))]
    pub additional_notes: String,
    /// Gaps in the evidence, derived from the sentinel fields.
    pub missing_information: Vec<String>,
}

impl Validate for DdrReport {
    const ENTITY: &'static str = "DdrReport";
    type Context = ();
    type Wire = DdrReport;

    fn from_wire(wire: DdrReport, path: &str, _: &(), out: &mut Vec<Violation>) -> Option<Self> {
        let at = |key: &str| field_path(path, key);
        let metadata = ReportMetadata::from_wire(wire.metadata, &at("metadata"), &(), out);
        let property_issue_summary =
            grounded_text(&wire.property_issue_summary, &at("property_issue_summary"), out);
        let severity_assessment =
            grounded_text(&wire.severity_assessment, &at("severity_assessment"), out);
        let recommended_actions =
            text_list(&wire.recommended_actions, &at("recommended_actions"), out);
        let additional_notes = grounded_text(&wire.additional_notes, &at("additional_notes"), out);
        let missing_information =
            text_list(&wire.missing_information, &at("missing_information"), out);

        let base = at("findings");
        let mut seen = HashSet::new();
        let mut findings = Vec::with_capacity(wire.findings.len());
        for (i, item) in wire.findings.into_iter().enumerate() {
            let p = index_path(&base, i);
            if let Some(f) = SynthesizedFinding::from_wire(item, &p, &(), out) {
                if !seen.insert(area_key(&f.area)) {
                    out.push(Violation::new(
                        field_path(&p, "area"),
                        format!("area '{}' appears more than once", f.area),
                    ));
                }
                findings.push(f);
            }
        }

        Some(DdrReport {
            metadata: metadata?,
            property_issue_summary: property_issue_summary?,
            findings,
            severity_assessment: severity_assessment?,
            recommended_actions: recommended_actions?,
            additional_notes: additional_notes?,
            missing_information: missing_information?,
        })
    }
}

impl DdrReport {
    /// Re-run the schema gate over an assembled report.
    pub fn check(&self) -> Result<(), SchemaError> {
        let raw = serde_json::to_value(self)
            .map_err(|e| SchemaError::malformed(Self::ENTITY, e.to_string()))?;
        DdrReport::validate(&raw, &()).map(|_| ())
    }

    /// Findings the two reports disagree on.
    pub fn conflicts(&self) -> impl Iterator<Item = &SynthesizedFinding> {
        self.findings.iter().filter(|f| f.conflict_flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::NOT_AVAILABLE;
    use serde_json::{json, Value};

    fn verdict(v: &str, note: &str) -> Value {
        json!({
            "area": "Attic",
            "verdict": v,
            "combined_assessment": "Text reports no issue; imaging shows a cold spot.",
            "conflict_note": note
        })
    }

    fn reconciliation(areas: Vec<Value>) -> Value {
        json!({
            "property_issue_summary": "Moisture in the kitchen.",
            "areas": areas,
            "severity_assessment": "Moderate, because staining is active.",
            "recommended_actions": ["Inspect roof flashing"],
            "additional_notes": "Not Available"
        })
    }

    #[test]
    fn contradictory_verdict_needs_a_note() {
        let raw = reconciliation(vec![verdict("contradictory", "")]);
        let err = Reconciliation::validate(&raw, &()).unwrap_err();
        assert_eq!(err.violations[0].path, "$.areas[0].conflict_note");
    }

    #[test]
    fn consistent_verdict_must_not_carry_a_note() {
        let raw = reconciliation(vec![verdict("consistent", "they differ")]);
        assert!(Reconciliation::validate(&raw, &()).is_err());
    }

    #[test]
    fn valid_reconciliation() {
        let raw = reconciliation(vec![verdict("contradictory", "Text says fine, imaging says not")]);
        let r = Reconciliation::validate(&raw, &()).expect("valid");
        assert_eq!(r.areas[0].verdict, Verdict::Contradictory);
        assert_eq!(r.additional_notes, NOT_AVAILABLE);
    }

    #[test]
    fn root_cause_is_not_accepted_from_the_model() {
        let mut raw = reconciliation(vec![]);
        raw["probable_root_cause"] = json!("Roof leak");
        let err = Reconciliation::validate(&raw, &()).unwrap_err();
        assert_eq!(err.violations[0].path, "$.probable_root_cause");
    }

    #[test]
    fn verdict_outside_the_set_is_rejected() {
        let raw = reconciliation(vec![verdict("Consistent", "")]);
        let err = Reconciliation::validate(&raw, &()).unwrap_err();
        assert_eq!(err.violations[0].path, "$.areas[0].verdict");
    }

    #[test]
    fn sentinel_action_is_rejected() {
        let mut raw = reconciliation(vec![]);
        raw["recommended_actions"] = json!(["Inspect roof flashing", "not available"]);
        let err = Reconciliation::validate(&raw, &()).unwrap_err();
        assert_eq!(err.violations[0].path, "$.recommended_actions[1]");
    }

    fn finding(area: &str, flag: bool, note: &str, agreement: Agreement) -> SynthesizedFinding {
        SynthesizedFinding {
            area: area.into(),
            general_summary: "Staining".into(),
            thermal_summary: "Cold spot".into(),
            combined_assessment: "Staining with cold spot".into(),
            severity: Severity::Moderate,
            probable_root_cause: NOT_AVAILABLE.into(),
            agreement,
            conflict_flag: flag,
            conflict_note: note.into(),
        }
    }

    fn report(findings: Vec<SynthesizedFinding>) -> DdrReport {
        DdrReport {
            metadata: ReportMetadata::default(),
            property_issue_summary: NOT_AVAILABLE.into(),
            findings,
            severity_assessment: NOT_AVAILABLE.into(),
            recommended_actions: vec![],
            additional_notes: NOT_AVAILABLE.into(),
            missing_information: vec![],
        }
    }

    #[test]
    fn report_check_accepts_consistent_findings() {
        let r = report(vec![
            finding("Kitchen", false, "", Agreement::Consistent),
            finding("Attic", true, "disagree", Agreement::Contradictory),
        ]);
        r.check().expect("valid");
        assert_eq!(r.conflicts().count(), 1);
    }

    #[test]
    fn report_check_rejects_flag_without_note() {
        let r = report(vec![finding("Attic", true, "", Agreement::Contradictory)]);
        let err = r.check().unwrap_err();
        assert!(err
            .violations
            .iter()
            .any(|v| v.path == "$.findings[0].conflict_note"));
    }

    #[test]
    fn report_check_rejects_duplicate_areas() {
        let r = report(vec![
            finding("Kitchen", false, "", Agreement::Consistent),
            finding(" kitchen ", false, "", Agreement::Complementary),
        ]);
        let err = r.check().unwrap_err();
        assert!(err.violations[0].message.contains("more than once"));
    }

    #[test]
    fn general_only_finding_cannot_have_thermal_summary() {
        let r = report(vec![finding("Kitchen", false, "", Agreement::GeneralOnly)]);
        let err = r.check().unwrap_err();
        assert_eq!(err.violations[0].path, "$.findings[0].thermal_summary");
    }
}
