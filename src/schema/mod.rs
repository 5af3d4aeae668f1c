//! Structured schema layer: the shape and validation rules of every entity
//! that crosses a reasoning-call boundary.
//!
//! Model output is never trusted as-is. Each entity implements [`Validate`]
//! and is checked in two passes:
//!
//! 1. **Structure.** The entity's wire shape derives [`JsonSchema`]; the
//!    generated schema is both what the model is shown and what the raw
//!    reply is validated against with `jsonschema`. Unknown keys, `null`,
//!    wrong types, values outside an enumerated set and empty strings are
//!    all rejected here, each with its JSON path.
//! 2. **Semantics.** Rules a JSON Schema cannot state (required text that
//!    is only the absence sentinel, page citations beyond the images sent,
//!    conflict-note invariants) run on the typed wire value.
//!
//! Nothing is coerced or repaired. The one piece of canonicalisation is the
//! absence sentinel: free text that equals [`NOT_AVAILABLE`] ignoring ASCII
//! case is stored as the exact sentinel, so downstream comparisons only ever
//! see one spelling.
//!
//! ## Entities
//!
//! | Entity | Produced by | Module |
//! |--------|-------------|--------|
//! | [`Observation`], [`GeneralReportData`] | general extractor | [`general`] |
//! | [`ThermalAnomaly`], [`ThermalReportData`] | thermal extractor | [`thermal`] |
//! | [`Reconciliation`] | synthesis reasoning call | [`report`] |
//! | [`SynthesizedFinding`], [`DdrReport`] | synthesizer | [`report`] |

pub mod general;
pub mod report;
pub mod thermal;

pub use general::{Confidence, GeneralReportData, Observation, ReportMetadata, Severity};
pub use report::{
    Agreement, AreaVerdict, DdrReport, Reconciliation, SynthesizedFinding, Verdict,
};
pub use thermal::{TemperatureDelta, ThermalAnomaly, ThermalReportData};

use jsonschema::error::ValidationErrorKind;
use once_cell::sync::Lazy;
use regex::Regex;
use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Sentinel stored in every field for which the sources hold no evidence.
pub const NOT_AVAILABLE: &str = "Not Available";

/// True when `s` is the absence sentinel (exact spelling).
pub fn is_not_available(s: &str) -> bool {
    s == NOT_AVAILABLE
}

/// One rule broken by a raw value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// JSON path of the offending value, e.g. `$.observations[2].severity`.
    pub path: String,
    pub message: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// A raw value rejected by the schema gate.
#[derive(Debug, Clone, Error)]
#[error("{entity} rejected ({} violation(s)): {}", .violations.len(), join_violations(.violations))]
pub struct SchemaError {
    /// Name of the entity that was being validated.
    pub entity: &'static str,
    pub violations: Vec<Violation>,
}

impl SchemaError {
    pub fn new(entity: &'static str, violations: Vec<Violation>) -> Self {
        Self { entity, violations }
    }

    /// A response that was not even parseable JSON.
    pub fn malformed(entity: &'static str, detail: impl Into<String>) -> Self {
        Self::new(entity, vec![Violation::new("$", detail)])
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Validation contract shared by every entity.
///
/// `Context` carries whatever the semantic rules need beyond the value
/// itself: the source text for the general report (used to derive
/// confidence), the page count for the thermal report, nothing for the rest.
pub trait Validate: Sized {
    /// Entity name used in [`SchemaError`].
    const ENTITY: &'static str;

    type Context: ?Sized;

    /// Serde shape of the raw value; its derived schema is the structural gate.
    type Wire: DeserializeOwned + JsonSchema;

    /// Apply the semantic rules to a structurally valid `wire` located at
    /// `path`, pushing every violation into `out`.
    ///
    /// Returns `None` when the entity cannot be built; callers must still
    /// treat a `Some` as invalid whenever `out` is non-empty.
    fn from_wire(
        wire: Self::Wire,
        path: &str,
        ctx: &Self::Context,
        out: &mut Vec<Violation>,
    ) -> Option<Self>;

    /// JSON Schema generated from [`Validate::Wire`].
    fn json_schema() -> Value {
        serde_json::to_value(schema_for!(Self::Wire)).unwrap_or_default()
    }

    /// Validate a complete raw value: `Ok` only when no rule is broken.
    fn validate(raw: &Value, ctx: &Self::Context) -> Result<Self, SchemaError> {
        let mut violations = structural_violations(&Self::json_schema(), raw);
        if !violations.is_empty() {
            return Err(SchemaError::new(Self::ENTITY, violations));
        }
        let wire: Self::Wire = serde_json::from_value(raw.clone())
            .map_err(|e| SchemaError::malformed(Self::ENTITY, e.to_string()))?;
        match Self::from_wire(wire, "$", ctx, &mut violations) {
            Some(entity) if violations.is_empty() => Ok(entity),
            _ => {
                if violations.is_empty() {
                    violations.push(Violation::new("$", "value could not be built"));
                }
                Err(SchemaError::new(Self::ENTITY, violations))
            }
        }
    }
}

/// Entities a reasoning call is asked to produce directly.
pub trait TargetSchema: Validate {
    /// [`Validate::json_schema`] pretty-printed for a prompt.
    fn schema_description() -> String {
        serde_json::to_string_pretty(&Self::json_schema()).unwrap_or_default()
    }
}

// ── Structural gate ──────────────────────────────────────────────────────

/// Every place `raw` breaks `schema`, with JSON paths.
fn structural_violations(schema: &Value, raw: &Value) -> Vec<Violation> {
    let validator = match jsonschema::validator_for(schema) {
        Ok(v) => v,
        Err(e) => return vec![Violation::new("$", format!("schema does not compile: {e}"))],
    };
    let mut out = Vec::new();
    for error in validator.iter_errors(raw) {
        let path = json_path(&error.instance_path.to_string());
        match &error.kind {
            ValidationErrorKind::AdditionalProperties { unexpected } => {
                for key in unexpected {
                    out.push(Violation::new(field_path(&path, key), "unknown field"));
                }
            }
            ValidationErrorKind::Required { property } => {
                let key = property.to_string();
                out.push(Violation::new(
                    field_path(&path, key.trim_matches('"')),
                    "missing required field",
                ));
            }
            ValidationErrorKind::Type { .. } if error.instance.is_null() => {
                out.push(Violation::new(
                    path,
                    format!("null is not allowed; use \"{NOT_AVAILABLE}\""),
                ));
            }
            _ => out.push(Violation::new(path, error.to_string())),
        }
    }
    out
}

/// Turn a JSON pointer (`/observations/0/area`) into `$.observations[0].area`.
fn json_path(pointer: &str) -> String {
    let mut path = String::from("$");
    for segment in pointer.split('/').skip(1) {
        let segment = segment.replace("~1", "/").replace("~0", "~");
        match segment.parse::<usize>() {
            Ok(idx) => path = index_path(&path, idx),
            Err(_) => path = field_path(&path, &segment),
        }
    }
    path
}

// ── Area labels ──────────────────────────────────────────────────────────

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Trim and collapse internal whitespace, keeping case.
pub fn clean_label(label: &str) -> String {
    RE_WHITESPACE.replace_all(label.trim(), " ").into_owned()
}

/// Matching key for an area label: cleaned and lowercased.
///
/// "Master  Bedroom " and "master bedroom" share a key; "Bedroom 1" does not.
pub fn area_key(label: &str) -> String {
    clean_label(label).to_lowercase()
}

// ── Semantic text rules ──────────────────────────────────────────────────
//
// The schema already guarantees strings are present and non-empty. These
// helpers cover what it cannot: whitespace-only text and the sentinel.

pub(crate) fn field_path(path: &str, key: &str) -> String {
    format!("{path}.{key}")
}

pub(crate) fn index_path(path: &str, idx: usize) -> String {
    format!("{path}[{idx}]")
}

/// Trimmed text, with any spelling of the sentinel stored exactly.
fn canonical_text(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.eq_ignore_ascii_case(NOT_AVAILABLE) {
        NOT_AVAILABLE.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Non-blank text that may be the sentinel.
pub(crate) fn grounded_text(value: &str, path: &str, out: &mut Vec<Violation>) -> Option<String> {
    let s = canonical_text(value);
    if s.is_empty() {
        out.push(Violation::new(
            path,
            format!("must not be blank; use \"{NOT_AVAILABLE}\" when unknown"),
        ));
        return None;
    }
    Some(s)
}

/// Non-blank text that must carry real content (no sentinel).
pub(crate) fn required_text(value: &str, path: &str, out: &mut Vec<Violation>) -> Option<String> {
    let s = grounded_text(value, path, out)?;
    if is_not_available(&s) {
        out.push(Violation::new(
            path,
            "must carry content, not the absence sentinel",
        ));
        return None;
    }
    Some(s)
}

/// List entries that each carry content.
pub(crate) fn text_list(values: &[String], path: &str, out: &mut Vec<Violation>) -> Option<Vec<String>> {
    let before = out.len();
    let mut list = Vec::with_capacity(values.len());
    for (i, value) in values.iter().enumerate() {
        let s = canonical_text(value);
        if s.is_empty() || is_not_available(&s) {
            out.push(Violation::new(index_path(path, i), "list entries must carry content"));
        } else {
            list.push(s);
        }
    }
    (out.len() == before).then_some(list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn area_key_normalises_case_and_whitespace() {
        assert_eq!(area_key("  Master   Bedroom "), "master bedroom");
        assert_eq!(area_key("KITCHEN"), area_key("kitchen"));
        assert_ne!(area_key("Master Bedroom"), area_key("Bedroom 1"));
    }

    #[test]
    fn clean_label_keeps_case() {
        assert_eq!(clean_label(" Living\tRoom "), "Living Room");
    }

    #[test]
    fn pointer_becomes_json_path() {
        assert_eq!(json_path(""), "$");
        assert_eq!(json_path("/observations/0/area"), "$.observations[0].area");
        assert_eq!(json_path("/a~1b/c~0d"), "$.a/b.c~d");
    }

    #[allow(dead_code)]
    #[derive(Debug, serde::Deserialize, JsonSchema)]
    #[serde(deny_unknown_fields)]
    struct Sample {
        #[schemars(length(min = 1))]
        area: String,
        items: Vec<String>,
    }

    fn sample_schema() -> Value {
        serde_json::to_value(schema_for!(Sample)).unwrap()
    }

    #[test]
    fn structure_reports_unknown_fields_by_path() {
        let raw = json!({"area": "Attic", "items": [], "colour": "red"});
        let out = structural_violations(&sample_schema(), &raw);
        assert_eq!(out, vec![Violation::new("$.colour", "unknown field")]);
    }

    #[test]
    fn structure_rejects_null_missing_and_empty() {
        let raw = json!({"area": null});
        let out = structural_violations(&sample_schema(), &raw);
        assert!(out.contains(&Violation::new("$.items", "missing required field")));
        let null = out.iter().find(|v| v.path == "$.area").unwrap();
        assert!(null.message.contains("null"), "got: {}", null.message);

        let out = structural_violations(&sample_schema(), &json!({"area": "", "items": [3]}));
        let paths: Vec<_> = out.iter().map(|v| v.path.as_str()).collect();
        assert!(paths.contains(&"$.area"));
        assert!(paths.contains(&"$.items[0]"));
    }

    #[test]
    fn sentinel_spelling_is_canonicalised() {
        let mut out = Vec::new();
        let s = grounded_text(" not available ", "$.a", &mut out);
        assert_eq!(s.as_deref(), Some(NOT_AVAILABLE));
        assert!(out.is_empty());
    }

    #[test]
    fn blank_text_is_rejected() {
        let mut out = Vec::new();
        assert!(grounded_text("   ", "$.a", &mut out).is_none());
        assert_eq!(out[0].path, "$.a");
    }

    #[test]
    fn required_text_rejects_sentinel() {
        let mut out = Vec::new();
        assert!(required_text("Not Available", "$.area", &mut out).is_none());
        assert_eq!(out[0].path, "$.area");
    }

    #[test]
    fn text_list_flags_each_bad_entry() {
        let items = vec!["Seal roof".to_string(), " ".to_string(), "n/a".to_string(), "not available".to_string()];
        let mut out = Vec::new();
        assert!(text_list(&items, "$.items", &mut out).is_none());
        let paths: Vec<_> = out.iter().map(|v| v.path.as_str()).collect();
        assert_eq!(paths, vec!["$.items[1]", "$.items[3]"]);
    }

    #[test]
    fn schema_error_display_names_entity_and_paths() {
        let err = SchemaError::new(
            "Observation",
            vec![
                Violation::new("$.area", "missing required field"),
                Violation::new("$.severity", "'high' is not one of: minor"),
            ],
        );
        let msg = err.to_string();
        assert!(msg.starts_with("Observation rejected (2 violation(s))"), "got: {msg}");
        assert!(msg.contains("$.severity"));
    }
}
