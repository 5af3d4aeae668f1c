//! Synthesizer: merge the two structured reports into one [`DdrReport`].
//!
//! Most of the merge is deterministic. Areas are grouped by exact normalised
//! label (after explicit aliases), per-source summaries are composed from the
//! extracted records, severity and root cause are taken only from what the
//! sources state. A single reasoning call judges the areas both sources cover
//! and writes the report-level narrative.
//!
//! ## Merge rules
//!
//! | Area covered by | Agreement | combined_assessment |
//! |-----------------|-----------|---------------------|
//! | general only | `general_only` | general summary |
//! | thermal only | `thermal_only` | thermal summary |
//! | both, consistent / complementary | verdict | model's merged text |
//! | both, contradictory | `contradictory` | both positions, side by side |
//!
//! A contradiction is never resolved: the finding carries both positions and
//! the model's description of the disagreement in `conflict_note`.

use crate::config::{AreaAliases, DdrConfig};
use crate::error::{DdrError, Stage};
use crate::output::CallUsage;
use crate::pipeline::llm::{request_structured, Grounding, ReasoningCapability, ReasoningRequest};
use crate::prompts::{reconciliation_prompt, RECONCILIATION_INSTRUCTIONS};
use crate::schema::{
    area_key, clean_label, is_not_available, Agreement, AreaVerdict, DdrReport,
    GeneralReportData, Observation, Reconciliation, ReportMetadata, Severity, SynthesizedFinding,
    TemperatureDelta, ThermalAnomaly, ThermalReportData, Verdict, NOT_AVAILABLE,
};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// All records of both sources that share one area key.
#[derive(Debug, Clone)]
pub struct AreaGroup {
    /// Normalised key after alias resolution.
    pub key: String,
    /// Display label: alias canonical name or first-seen cleaned label.
    pub label: String,
    pub observations: Vec<Observation>,
    pub anomalies: Vec<ThermalAnomaly>,
}

impl AreaGroup {
    pub fn is_overlap(&self) -> bool {
        !self.observations.is_empty() && !self.anomalies.is_empty()
    }

    /// What the general report says about this area.
    pub fn general_summary(&self) -> String {
        let parts = dedup(self.observations.iter().map(|o| o.description.clone()));
        if parts.is_empty() {
            NOT_AVAILABLE.to_string()
        } else {
            parts.join("; ")
        }
    }

    /// What the thermal images show for this area.
    pub fn thermal_summary(&self) -> String {
        let parts = dedup(self.anomalies.iter().map(describe_anomaly));
        if parts.is_empty() {
            NOT_AVAILABLE.to_string()
        } else {
            parts.join("; ")
        }
    }

    /// Highest severity the general report states for this area.
    pub fn severity(&self) -> Severity {
        self.observations
            .iter()
            .map(|o| o.severity)
            .max()
            .unwrap_or(Severity::NotAvailable)
    }

    /// Causes stated by either source, de-duplicated, or the sentinel.
    pub fn root_cause(&self) -> String {
        let stated = self
            .observations
            .iter()
            .map(|o| o.stated_cause.as_str())
            .chain(self.anomalies.iter().map(|a| a.stated_cause.as_str()))
            .filter(|c| !is_not_available(c))
            .map(str::to_string);
        let causes = dedup(stated);
        if causes.is_empty() {
            NOT_AVAILABLE.to_string()
        } else {
            causes.join("; ")
        }
    }
}

/// `"insulation gap: cold band along eaves (-6.5 °C, page 2)"`.
fn describe_anomaly(a: &ThermalAnomaly) -> String {
    let mut s = if is_not_available(&a.anomaly_type) {
        a.description.clone()
    } else {
        format!("{}: {}", a.anomaly_type, a.description)
    };
    match a.temperature_delta {
        TemperatureDelta::Celsius(_) => {
            s.push_str(&format!(" ({}, page {})", a.temperature_delta, a.page))
        }
        TemperatureDelta::NotAvailable => s.push_str(&format!(" (page {})", a.page)),
    }
    s
}

/// Keep first occurrences, comparing case- and whitespace-insensitively.
fn dedup(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .filter(|s| seen.insert(area_key(s)))
        .collect()
}

/// Group every record of both sources by area.
///
/// Order is first appearance: general observations first, then thermal
/// anomalies for areas the general report does not mention.
pub fn group_areas(
    general: GeneralReportData,
    thermal: ThermalReportData,
    aliases: &AreaAliases,
) -> Vec<AreaGroup> {
    let mut groups: Vec<AreaGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    let mut slot = |label: &str, groups: &mut Vec<AreaGroup>| -> usize {
        let key = aliases.key(label);
        *index.entry(key.clone()).or_insert_with(|| {
            let display = aliases
                .canonical(label)
                .map(str::to_string)
                .unwrap_or_else(|| clean_label(label));
            groups.push(AreaGroup {
                key,
                label: display,
                observations: Vec::new(),
                anomalies: Vec::new(),
            });
            groups.len() - 1
        })
    };

    for obs in general.observations {
        let i = slot(&obs.area, &mut groups);
        groups[i].observations.push(obs);
    }
    for anomaly in thermal.anomalies {
        let i = slot(&anomaly.area, &mut groups);
        groups[i].anomalies.push(anomaly);
    }
    groups
}

/// Merge metadata field by field: the general report wins, thermal fills gaps.
pub fn merge_metadata(general: &ReportMetadata, thermal: &ReportMetadata) -> ReportMetadata {
    let pick = |field: &str, g: &str, t: &str| -> String {
        if !is_not_available(g) && !is_not_available(t) && area_key(g) != area_key(t) {
            warn!("Reports disagree on {field}: '{g}' vs '{t}'; using the inspection report");
        }
        let chosen = if is_not_available(g) { t } else { g };
        chosen.to_string()
    };
    ReportMetadata {
        property_address: pick(
            "property address",
            &general.property_address,
            &thermal.property_address,
        ),
        inspection_date: pick(
            "inspection date",
            &general.inspection_date,
            &thermal.inspection_date,
        ),
    }
}

/// Merge both reports into a validated [`DdrReport`].
///
/// Returns the usage of the reconciliation call, or `None` when the reports
/// hold no areas at all and no call was needed.
pub async fn synthesize(
    capability: &dyn ReasoningCapability,
    general: GeneralReportData,
    thermal: ThermalReportData,
    config: &DdrConfig,
) -> Result<(DdrReport, Option<CallUsage>), DdrError> {
    let metadata = merge_metadata(&general.metadata, &thermal.metadata);
    let groups = group_areas(general, thermal, &config.aliases);
    let overlap: Vec<String> = groups
        .iter()
        .filter(|g| g.is_overlap())
        .map(|g| g.label.clone())
        .collect();
    info!(
        "Synthesis: {} area(s), {} covered by both reports",
        groups.len(),
        overlap.len()
    );

    let (reconciliation, usage) = if groups.is_empty() {
        debug!("No areas in either report; skipping reconciliation call");
        (empty_reconciliation(), None)
    } else {
        let request = ReasoningRequest {
            stage: Stage::Synthesis,
            instructions: RECONCILIATION_INSTRUCTIONS.to_string(),
            prompt: reconciliation_prompt(&overlap),
            grounding: Grounding::Text(reconciliation_document(&groups)),
            temperature: config.synthesis_temperature,
            max_tokens: config.max_tokens,
        };
        let (rec, usage) = request_structured::<Reconciliation>(capability, &request, &()).await?;
        (rec, Some(usage))
    };

    let report = assemble(metadata, groups, reconciliation, &config.aliases)?;
    Ok((report, usage))
}

fn empty_reconciliation() -> Reconciliation {
    Reconciliation {
        property_issue_summary: NOT_AVAILABLE.to_string(),
        areas: Vec::new(),
        severity_assessment: NOT_AVAILABLE.to_string(),
        recommended_actions: Vec::new(),
        additional_notes: NOT_AVAILABLE.to_string(),
    }
}

/// The grouped evidence sent to the reconciliation call.
fn reconciliation_document(groups: &[AreaGroup]) -> String {
    let areas: Vec<Value> = groups
        .iter()
        .map(|g| {
            json!({
                "area": g.label,
                "general_inspection": g.observations.iter().map(|o| json!({
                    "description": o.description,
                    "severity": o.severity,
                    "stated_cause": o.stated_cause,
                })).collect::<Vec<_>>(),
                "thermal_imaging": g.anomalies.iter().map(|a| json!({
                    "anomaly_type": a.anomaly_type,
                    "temperature_delta": a.temperature_delta,
                    "description": a.description,
                    "visual_cue": a.visual_cue,
                    "page": a.page,
                })).collect::<Vec<_>>(),
            })
        })
        .collect();
    serde_json::to_string_pretty(&json!({ "areas": areas })).unwrap_or_default()
}

/// Build the final report from the groups and the reconciliation answer.
fn assemble(
    metadata: ReportMetadata,
    groups: Vec<AreaGroup>,
    reconciliation: Reconciliation,
    aliases: &AreaAliases,
) -> Result<DdrReport, DdrError> {
    let mut verdicts = index_verdicts(&groups, reconciliation.areas, aliases)?;

    let findings: Vec<SynthesizedFinding> = groups
        .iter()
        .map(|g| {
            let verdict = verdicts.remove(&g.key);
            finding_for(g, verdict)
        })
        .collect::<Result<_, _>>()?;

    let report = DdrReport {
        missing_information: missing_information(&metadata, &groups, &findings),
        metadata,
        property_issue_summary: reconciliation.property_issue_summary,
        findings,
        severity_assessment: reconciliation.severity_assessment,
        recommended_actions: reconciliation.recommended_actions,
        additional_notes: reconciliation.additional_notes,
    };

    check_union(&groups, &report)?;
    report.check().map_err(|e| DdrError::SynthesisFailure {
        detail: e.to_string(),
    })?;
    Ok(report)
}

/// Key every verdict by area, rejecting unknown, single-source or repeated areas.
///
/// The prompt lists each group's canonical label, so a verdict is matched on
/// that label first. Aliases are applied only when the model answered with
/// an alias instead, since a canonical name may itself be an alias key.
fn index_verdicts(
    groups: &[AreaGroup],
    verdicts: Vec<AreaVerdict>,
    aliases: &AreaAliases,
) -> Result<HashMap<String, AreaVerdict>, DdrError> {
    let overlap: HashSet<&str> = groups
        .iter()
        .filter(|g| g.is_overlap())
        .map(|g| g.key.as_str())
        .collect();

    let mut by_key = HashMap::with_capacity(verdicts.len());
    for v in verdicts {
        let direct = area_key(&v.area);
        let key = if overlap.contains(direct.as_str()) {
            direct
        } else {
            aliases.key(&v.area)
        };
        if !overlap.contains(key.as_str()) {
            return Err(DdrError::SynthesisFailure {
                detail: format!(
                    "verdict for '{}', which is not an area both reports cover",
                    v.area
                ),
            });
        }
        if by_key.contains_key(&key) {
            return Err(DdrError::SynthesisFailure {
                detail: format!("area '{}' was judged more than once", v.area),
            });
        }
        by_key.insert(key, v);
    }
    Ok(by_key)
}

fn finding_for(group: &AreaGroup, verdict: Option<AreaVerdict>) -> Result<SynthesizedFinding, DdrError> {
    let general_summary = group.general_summary();
    let thermal_summary = group.thermal_summary();
    let severity = group.severity();
    let probable_root_cause = group.root_cause();

    let (agreement, combined_assessment, conflict_note) = if group.is_overlap() {
        let v = verdict.ok_or_else(|| DdrError::SynthesisFailure {
            detail: format!("no verdict for '{}', which both reports cover", group.label),
        })?;
        match v.verdict {
            Verdict::Contradictory => (
                Agreement::Contradictory,
                both_positions(&general_summary, &thermal_summary),
                v.conflict_note,
            ),
            other => (other.into(), v.combined_assessment, String::new()),
        }
    } else if group.observations.is_empty() {
        (Agreement::ThermalOnly, thermal_summary.clone(), String::new())
    } else {
        (Agreement::GeneralOnly, general_summary.clone(), String::new())
    };

    Ok(SynthesizedFinding {
        area: group.label.clone(),
        general_summary,
        thermal_summary,
        combined_assessment,
        severity,
        probable_root_cause,
        conflict_flag: agreement == Agreement::Contradictory,
        agreement,
        conflict_note,
    })
}

/// Present both sides of a contradiction without choosing one.
fn both_positions(general: &str, thermal: &str) -> String {
    format!(
        "Inspection report: {} Thermal imaging: {}",
        sentence(general),
        sentence(thermal)
    )
}

fn sentence(s: &str) -> String {
    let s = s.trim();
    if s.ends_with(['.', '!', '?']) {
        s.to_string()
    } else {
        format!("{s}.")
    }
}

/// Gaps in the evidence, derived from sentinel fields only.
fn missing_information(
    metadata: &ReportMetadata,
    groups: &[AreaGroup],
    findings: &[SynthesizedFinding],
) -> Vec<String> {
    let mut gaps = Vec::new();
    if is_not_available(&metadata.property_address) {
        gaps.push("Property address is not stated in either report.".to_string());
    }
    if is_not_available(&metadata.inspection_date) {
        gaps.push("Inspection date is not stated in either report.".to_string());
    }

    for (group, finding) in groups.iter().zip(findings) {
        let area = &finding.area;
        match finding.agreement {
            Agreement::GeneralOnly => {
                gaps.push(format!("{area}: no thermal imaging of this area."))
            }
            Agreement::ThermalOnly => {
                gaps.push(format!("{area}: not covered by the inspection report."))
            }
            _ => {}
        }
        if !group.observations.is_empty() && !finding.severity.is_stated() {
            gaps.push(format!("{area}: severity is not stated."));
        }
        if group
            .anomalies
            .iter()
            .any(|a| a.temperature_delta == TemperatureDelta::NotAvailable)
        {
            gaps.push(format!("{area}: temperature difference is not recorded."));
        }
        if is_not_available(&finding.probable_root_cause) {
            gaps.push(format!("{area}: probable root cause is not stated."));
        }
    }
    gaps
}

/// Every area of either source appears exactly once, in group order.
fn check_union(groups: &[AreaGroup], report: &DdrReport) -> Result<(), DdrError> {
    let expected: Vec<&str> = groups.iter().map(|g| g.label.as_str()).collect();
    let actual: Vec<&str> = report.findings.iter().map(|f| f.area.as_str()).collect();
    if expected != actual {
        return Err(DdrError::SynthesisFailure {
            detail: format!("findings {actual:?} do not cover areas {expected:?}"),
        });
    }
    Ok(())
}
