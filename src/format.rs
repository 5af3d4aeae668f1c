//! Formatter: render a [`DdrReport`] as a client-facing document.
//!
//! [`render_markdown`] is pure and total: the same report always yields the
//! same bytes, and every field has exactly one rendering rule. The sentinel
//! renders as `_Not Available_` so gaps stand out instead of reading like
//! findings.

use crate::error::DdrError;
use crate::schema::{
    is_not_available, Agreement, DdrReport, Severity, SynthesizedFinding, NOT_AVAILABLE,
};
use std::fmt::Write as _;

const TITLE: &str = "# Detailed Diagnostic Report (DDR)";

/// Render `report` as Markdown, ending with exactly one newline.
pub fn render_markdown(report: &DdrReport) -> String {
    let mut md = String::new();

    section(&mut md, TITLE);
    bullet(&mut md, "Property address", &report.metadata.property_address);
    bullet(&mut md, "Inspection date", &report.metadata.inspection_date);
    md.push('\n');

    section(&mut md, "## 1. Property Issue Summary");
    paragraph(&mut md, &report.property_issue_summary);

    section(&mut md, "## 2. Area-wise Observations");
    if report.findings.is_empty() {
        paragraph(&mut md, NOT_AVAILABLE);
    }
    for finding in &report.findings {
        render_finding(&mut md, finding);
    }

    section(&mut md, "## 3. Probable Root Cause");
    if report.findings.is_empty() {
        paragraph(&mut md, NOT_AVAILABLE);
    } else {
        for f in &report.findings {
            bullet(&mut md, &f.area, &f.probable_root_cause);
        }
        md.push('\n');
    }

    section(&mut md, "## 4. Severity Assessment");
    paragraph(&mut md, &report.severity_assessment);

    section(&mut md, "## 5. Recommended Actions");
    list(&mut md, &report.recommended_actions, &text(NOT_AVAILABLE));

    section(&mut md, "## 6. Additional Notes");
    paragraph(&mut md, &report.additional_notes);

    section(&mut md, "## 7. Missing or Unclear Information");
    list(&mut md, &report.missing_information, "None identified.");

    let mut out = md.trim_end().to_string();
    out.push('\n');
    out
}

/// Pretty JSON of the structured report, ending with one newline.
pub fn render_json(report: &DdrReport) -> Result<String, DdrError> {
    let mut json = serde_json::to_string_pretty(report)
        .map_err(|e| DdrError::Internal(format!("failed to serialise report: {e}")))?;
    json.push('\n');
    Ok(json)
}

fn render_finding(md: &mut String, f: &SynthesizedFinding) {
    section(md, &format!("### {}", inline(&f.area)));
    bullet(md, "Inspection report", &f.general_summary);
    bullet(md, "Thermal imaging", &f.thermal_summary);
    bullet(md, "Assessment", &f.combined_assessment);
    let _ = writeln!(md, "- **Severity:** {}", severity(f.severity));
    let _ = writeln!(md, "- **Sources:** {}", agreement(f.agreement));
    if f.conflict_flag {
        bullet(md, "⚠ Conflict", &f.conflict_note);
    }
    md.push('\n');
}

fn section(md: &mut String, heading: &str) {
    md.push_str(heading);
    md.push_str("\n\n");
}

fn paragraph(md: &mut String, s: &str) {
    md.push_str(&text(s));
    md.push_str("\n\n");
}

fn bullet(md: &mut String, label: &str, value: &str) {
    let _ = writeln!(md, "- **{}:** {}", inline(label), text(value));
}

fn list(md: &mut String, items: &[String], empty: &str) {
    if items.is_empty() {
        md.push_str(empty);
        md.push('\n');
    }
    for item in items {
        let _ = writeln!(md, "- {}", text(item));
    }
    md.push('\n');
}

/// Field text: sentinel in italics, everything else on one line.
fn text(s: &str) -> String {
    if is_not_available(s) {
        format!("_{NOT_AVAILABLE}_")
    } else {
        inline(s)
    }
}

/// Collapse every run of whitespace, including newlines, to one space.
fn inline(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn severity(s: Severity) -> String {
    match s {
        Severity::NotAvailable => text(NOT_AVAILABLE),
        other => {
            let word = other.as_str();
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        }
    }
}

fn agreement(a: Agreement) -> &'static str {
    match a {
        Agreement::GeneralOnly => "Inspection report only",
        Agreement::ThermalOnly => "Thermal imaging only",
        Agreement::Consistent => "Both reports agree",
        Agreement::Complementary => "The reports complement each other",
        Agreement::Contradictory => "The reports disagree",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ReportMetadata;

    fn finding(area: &str, flag: bool) -> SynthesizedFinding {
        SynthesizedFinding {
            area: area.into(),
            general_summary: "No issues found".into(),
            thermal_summary: if flag { "Cold spot (-4.0 °C, page 1)".into() } else { NOT_AVAILABLE.into() },
            combined_assessment: "Inspection report: No issues found.\nThermal imaging: Cold spot.".into(),
            severity: Severity::NotAvailable,
            probable_root_cause: NOT_AVAILABLE.into(),
            agreement: if flag { Agreement::Contradictory } else { Agreement::GeneralOnly },
            conflict_flag: flag,
            conflict_note: if flag { "The reports disagree on the attic.".into() } else { String::new() },
        }
    }

    fn report() -> DdrReport {
        DdrReport {
            metadata: ReportMetadata {
                property_address: "12 Oak Lane".into(),
                inspection_date: NOT_AVAILABLE.into(),
            },
            property_issue_summary: "Moisture in the attic.".into(),
            findings: vec![finding("Attic", true), finding("Kitchen", false)],
            severity_assessment: "Moderate".into(),
            recommended_actions: vec!["Inspect roof".into()],
            additional_notes: NOT_AVAILABLE.into(),
            missing_information: vec![],
        }
    }

    #[test]
    fn rendering_is_idempotent() {
        let r = report();
        assert_eq!(render_markdown(&r), render_markdown(&r));
    }

    #[test]
    fn sentinel_renders_in_italics() {
        let md = render_markdown(&report());
        assert!(md.contains("- **Inspection date:** _Not Available_"));
        assert!(md.contains("## 6. Additional Notes\n\n_Not Available_\n"));
    }

    #[test]
    fn newlines_in_fields_collapse() {
        let md = render_markdown(&report());
        assert!(md.contains(
            "- **Assessment:** Inspection report: No issues found. Thermal imaging: Cold spot."
        ));
    }

    #[test]
    fn conflicts_are_rendered_only_when_flagged() {
        let md = render_markdown(&report());
        assert_eq!(md.matches("⚠ Conflict").count(), 1);
        assert!(md.contains("- **⚠ Conflict:** The reports disagree on the attic."));
    }

    #[test]
    fn sections_appear_in_order() {
        let md = render_markdown(&report());
        let positions: Vec<usize> = (1..=7)
            .map(|n| md.find(&format!("## {n}.")).expect("section present"))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn ends_with_exactly_one_newline() {
        let md = render_markdown(&report());
        assert!(md.ends_with("None identified.\n"));
        assert!(!md.ends_with("\n\n"));
    }

    #[test]
    fn empty_report_renders_placeholders() {
        let mut r = report();
        r.findings.clear();
        r.recommended_actions.clear();
        let md = render_markdown(&r);
        assert!(md.contains("## 2. Area-wise Observations\n\n_Not Available_\n"));
        assert!(md.contains("## 5. Recommended Actions\n\n_Not Available_\n"));
    }

    #[test]
    fn severity_is_capitalised() {
        assert_eq!(severity(Severity::Moderate), "Moderate");
        assert_eq!(severity(Severity::NotAvailable), "_Not Available_");
    }

    #[test]
    fn json_has_snake_case_agreement() {
        let json = render_json(&report()).unwrap();
        assert!(json.contains("\"agreement\": \"contradictory\""));
        assert!(json.ends_with("}\n"));
    }
}
