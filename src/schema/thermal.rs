//! Entities extracted from the image-based thermal-imaging report.

use super::{
    field_path, grounded_text, index_path, required_text, ReportMetadata, TargetSchema, Validate,
    Violation, NOT_AVAILABLE,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Temperature difference between the anomaly and its surroundings, in °C.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TemperatureDelta {
    Celsius(f64),
    NotAvailable,
}

/// A temperature difference as the model writes it.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum DeltaWire {
    /// Degrees Celsius, signed, as printed on the page
    Degrees(f64),
    /// 'Not Available' when the page prints no value
    Text(String),
}

impl TemperatureDelta {
    fn from_wire(wire: DeltaWire, path: &str, out: &mut Vec<Violation>) -> Option<Self> {
        match wire {
            DeltaWire::Degrees(v) if v.is_finite() => Some(TemperatureDelta::Celsius(v)),
            DeltaWire::Degrees(_) => {
                out.push(Violation::new(path, "not a finite number"));
                None
            }
            DeltaWire::Text(s) if s.trim().eq_ignore_ascii_case(NOT_AVAILABLE) => {
                Some(TemperatureDelta::NotAvailable)
            }
            DeltaWire::Text(s) => {
                out.push(Violation::new(
                    path,
                    format!("expected a number of degrees or \"{NOT_AVAILABLE}\", got {s:?}"),
                ));
                None
            }
        }
    }
}

impl fmt::Display for TemperatureDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemperatureDelta::Celsius(v) => write!(f, "{v:+.1} °C"),
            TemperatureDelta::NotAvailable => f.write_str(NOT_AVAILABLE),
        }
    }
}

impl Serialize for TemperatureDelta {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TemperatureDelta::Celsius(v) => serializer.serialize_f64(*v),
            TemperatureDelta::NotAvailable => serializer.serialize_str(NOT_AVAILABLE),
        }
    }
}

/// One anomaly read off a thermal image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThermalAnomaly {
    pub area: String,
    /// e.g. "moisture intrusion", "insulation gap".
    pub anomaly_type: String,
    pub temperature_delta: TemperatureDelta,
    pub description: String,
    /// The visible thermal cue the anomaly is attributed to.
    pub visual_cue: String,
    /// 1-based page of the thermal report the cue appears on.
    pub page: usize,
    pub stated_cause: String,
}

/// One anomaly as the model reports it.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[schemars(rename = "ThermalAnomaly")]
pub struct AnomalyWire {
    /// Room or location as labelled on the image or page
    #[schemars(length(min = 1))]
    area: String,
    /// e.g. 'moisture intrusion', 'insulation gap', 'air leakage'; 'Not Available' if not identifiable
    #[schemars(length(min = 1))]
    anomaly_type: String,
    /// Difference to surroundings in °C as printed on the page, or 'Not Available'
    temperature_delta: DeltaWire,
    #[schemars(length(min = 1))]
    description: String,
    /// The visible pattern in the image that shows the anomaly, e.g. 'dark blue patch along ceiling edge'
    #[schemars(length(min = 1))]
    visual_cue: String,
    /// 1-based index of the image the cue appears on
    #[schemars(range(min = 1))]
    page: usize,
    /// Cause printed on the page; otherwise 'Not Available'
    #[schemars(length(min = 1))]
    stated_cause: String,
}

impl Validate for ThermalAnomaly {
    const ENTITY: &'static str = "ThermalAnomaly";
    /// Number of page images that were shown to the model.
    type Context = usize;
    type Wire = AnomalyWire;

    fn from_wire(
        wire: AnomalyWire,
        path: &str,
        page_count: &usize,
        out: &mut Vec<Violation>,
    ) -> Option<Self> {
        let area = required_text(&wire.area, &field_path(path, "area"), out);
        let anomaly_type = grounded_text(&wire.anomaly_type, &field_path(path, "anomaly_type"), out);
        let temperature_delta =
            TemperatureDelta::from_wire(wire.temperature_delta, &field_path(path, "temperature_delta"), out);
        let description = required_text(&wire.description, &field_path(path, "description"), out);
        let visual_cue = required_text(&wire.visual_cue, &field_path(path, "visual_cue"), out);
        let page = cited_page(wire.page, &field_path(path, "page"), *page_count, out);
        let stated_cause = grounded_text(&wire.stated_cause, &field_path(path, "stated_cause"), out);

        Some(ThermalAnomaly {
            area: area?,
            anomaly_type: anomaly_type?,
            temperature_delta: temperature_delta?,
            description: description?,
            visual_cue: visual_cue?,
            page: page?,
            stated_cause: stated_cause?,
        })
    }
}

fn cited_page(page: usize, path: &str, page_count: usize, out: &mut Vec<Violation>) -> Option<usize> {
    if (1..=page_count).contains(&page) {
        Some(page)
    } else {
        out.push(Violation::new(
            path,
            format!("page {page} is outside the {page_count} page(s) provided"),
        ));
        None
    }
}

/// Everything the thermal report extractor produces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThermalReportData {
    pub anomalies: Vec<ThermalAnomaly>,
    pub metadata: ReportMetadata,
}

/// The thermal extractor's reply.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[schemars(rename = "ThermalReportData")]
pub struct ThermalReportWire {
    /// One entry per anomaly visible in the images
    anomalies: Vec<AnomalyWire>,
    #[serde(default)]
    metadata: ReportMetadata,
}

impl Validate for ThermalReportData {
    const ENTITY: &'static str = "ThermalReportData";
    type Context = usize;
    type Wire = ThermalReportWire;

    fn from_wire(
        wire: ThermalReportWire,
        path: &str,
        page_count: &usize,
        out: &mut Vec<Violation>,
    ) -> Option<Self> {
        let metadata = ReportMetadata::from_wire(wire.metadata, &field_path(path, "metadata"), &(), out);
        let base = field_path(path, "anomalies");
        let anomalies: Vec<Option<ThermalAnomaly>> = wire
            .anomalies
            .into_iter()
            .enumerate()
            .map(|(i, item)| ThermalAnomaly::from_wire(item, &index_path(&base, i), page_count, out))
            .collect();
        Some(ThermalReportData {
            anomalies: anomalies.into_iter().collect::<Option<Vec<_>>>()?,
            metadata: metadata?,
        })
    }
}

impl TargetSchema for ThermalReportData {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn anomaly(page: Value, delta: Value) -> Value {
        json!({
            "area": "Attic",
            "anomaly_type": "insulation gap",
            "temperature_delta": delta,
            "description": "Large cold spot along the eaves",
            "visual_cue": "dark blue band at roof junction",
            "page": page,
            "stated_cause": "Not Available"
        })
    }

    #[test]
    fn valid_anomaly_with_numeric_delta() {
        let raw = json!({"anomalies": [anomaly(json!(2), json!(-6.5))]});
        let data = ThermalReportData::validate(&raw, &3).expect("valid");
        assert_eq!(data.anomalies[0].temperature_delta, TemperatureDelta::Celsius(-6.5));
        assert_eq!(data.anomalies[0].page, 2);
    }

    #[test]
    fn delta_may_be_the_sentinel() {
        let raw = json!({"anomalies": [anomaly(json!(1), json!("Not Available"))]});
        let data = ThermalReportData::validate(&raw, &1).expect("valid");
        assert_eq!(data.anomalies[0].temperature_delta, TemperatureDelta::NotAvailable);
    }

    #[test]
    fn delta_with_units_in_a_string_is_rejected() {
        let raw = json!({"anomalies": [anomaly(json!(1), json!("-6.5 °C"))]});
        let err = ThermalReportData::validate(&raw, &1).unwrap_err();
        assert_eq!(err.violations[0].path, "$.anomalies[0].temperature_delta");
    }

    #[test]
    fn page_outside_the_document_is_rejected() {
        let raw = json!({"anomalies": [anomaly(json!(4), json!(1.0))]});
        let err = ThermalReportData::validate(&raw, &3).unwrap_err();
        assert_eq!(err.violations[0].path, "$.anomalies[0].page");
        assert!(err.violations[0].message.contains("outside"));
    }

    #[test]
    fn page_zero_is_rejected_by_the_schema() {
        let raw = json!({"anomalies": [anomaly(json!(0), json!(1.0))]});
        let err = ThermalReportData::validate(&raw, &3).unwrap_err();
        assert_eq!(err.violations[0].path, "$.anomalies[0].page");
    }

    #[test]
    fn delta_sentinel_is_matched_ignoring_case() {
        let raw = json!({"anomalies": [anomaly(json!(1), json!("not available"))]});
        let data = ThermalReportData::validate(&raw, &1).expect("valid");
        assert_eq!(data.anomalies[0].temperature_delta, TemperatureDelta::NotAvailable);
    }

    #[test]
    fn delta_null_is_rejected() {
        let raw = json!({"anomalies": [anomaly(json!(1), Value::Null)]});
        let err = ThermalReportData::validate(&raw, &1).unwrap_err();
        assert_eq!(err.violations[0].path, "$.anomalies[0].temperature_delta");
    }

    #[test]
    fn anomaly_without_visual_cue_is_rejected() {
        let mut a = anomaly(json!(1), json!(1.0));
        a["visual_cue"] = json!("Not Available");
        let raw = json!({"anomalies": [a]});
        let err = ThermalReportData::validate(&raw, &1).unwrap_err();
        assert_eq!(err.violations[0].path, "$.anomalies[0].visual_cue");
    }

    #[test]
    fn delta_serialises_as_number_or_sentinel() {
        assert_eq!(
            serde_json::to_value(TemperatureDelta::Celsius(3.0)).unwrap(),
            json!(3.0)
        );
        assert_eq!(
            serde_json::to_value(TemperatureDelta::NotAvailable).unwrap(),
            json!(NOT_AVAILABLE)
        );
        assert_eq!(TemperatureDelta::Celsius(-6.5).to_string(), "-6.5 °C");
    }
}
