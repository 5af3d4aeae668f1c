//! Response hygiene: turn a model's text reply into a JSON value.
//!
//! Even when asked for bare JSON, chat models wrap answers in ```` ```json ````
//! fences, prepend a BOM, or use `\r\n`. These are transport artefacts, so
//! they are stripped here with a few deterministic rules. The JSON payload
//! itself is never edited: invisible characters are trimmed only around the
//! value, and a bare `\r` can only occur between tokens of valid JSON. If the
//! result does not parse, the caller reports a schema violation instead of
//! guessing what the model meant.
//!
//! ## Rule Order
//!
//! 1. Trim invisible Unicode (BOM, zero-width characters) around the reply
//! 2. Normalise line endings (CRLF → LF)
//! 3. Strip an outer markdown fence, then trim invisibles inside it
//! 4. Parse as JSON; the top level must be an object

use crate::schema::SchemaError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Clean `reply` and parse it as a JSON object for `entity`.
pub fn parse_json_reply(reply: &str, entity: &'static str) -> Result<Value, SchemaError> {
    let s = normalise_line_endings(trim_invisible(reply));
    let s = strip_outer_fence(&s);
    let trimmed = trim_invisible(&s);

    if trimmed.is_empty() {
        return Err(SchemaError::malformed(entity, "model returned an empty reply"));
    }

    let value: Value = serde_json::from_str(trimmed).map_err(|e| {
        SchemaError::malformed(
            entity,
            format!("reply is not valid JSON ({e}); starts with {:?}", preview(trimmed)),
        )
    })?;

    if !value.is_object() {
        return Err(SchemaError::malformed(
            entity,
            "reply must be a single JSON object",
        ));
    }
    Ok(value)
}

// ── Rule 1: Trim invisible Unicode characters ───────────────────────────────

const INVISIBLE: [char; 6] = [
    '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
];

/// Trim whitespace and invisible characters from both ends only.
fn trim_invisible(input: &str) -> &str {
    input.trim_matches(|c: char| c.is_whitespace() || INVISIBLE.contains(&c))
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Strip outer markdown fence ───────────────────────────────────────

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\n(.*)\n```\s*$").unwrap());

fn strip_outer_fence(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCE.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

fn preview(s: &str) -> String {
    s.chars().take(40).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_json_object() {
        let v = parse_json_reply(r#"{"observations": []}"#, "GeneralReportData").unwrap();
        assert!(v["observations"].is_array());
    }

    #[test]
    fn fenced_json_is_unwrapped() {
        let reply = "```json\n{\"anomalies\": []}\n```";
        let v = parse_json_reply(reply, "ThermalReportData").unwrap();
        assert!(v["anomalies"].is_array());
    }

    #[test]
    fn bom_and_crlf_are_removed() {
        let reply = "\u{FEFF}```\r\n{\"a\": 1}\r\n```\r\n";
        let v = parse_json_reply(reply, "X").unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn prose_around_json_is_rejected() {
        let reply = "Here is the data: {\"observations\": []}";
        let err = parse_json_reply(reply, "GeneralReportData").unwrap_err();
        assert_eq!(err.entity, "GeneralReportData");
        assert!(err.violations[0].message.contains("not valid JSON"));
    }

    #[test]
    fn top_level_array_is_rejected() {
        let err = parse_json_reply("[]", "GeneralReportData").unwrap_err();
        assert!(err.violations[0].message.contains("single JSON object"));
    }

    #[test]
    fn empty_reply_is_rejected() {
        assert!(parse_json_reply("  \n", "X").is_err());
    }

    #[test]
    fn test_trim_invisible() {
        let input = "\u{FEFF}\u{200B} hello\u{200B}world\u{00AD}\n\u{2060}";
        assert_eq!(trim_invisible(input), "hello\u{200B}world");
    }

    #[test]
    fn invisibles_inside_string_values_survive() {
        let reply = "\u{FEFF}{\"a\": \"co\u{00AD}operate\", \"b\": \"x\u{200D}y\"}\u{200B}";
        let v = parse_json_reply(reply, "X").unwrap();
        assert_eq!(v["a"], "co\u{00AD}operate");
        assert_eq!(v["b"], "x\u{200D}y");
    }

    #[test]
    fn bom_inside_fence_is_trimmed() {
        let reply = "```json\n\u{FEFF}{\"a\": 1}\n```";
        let v = parse_json_reply(reply, "X").unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn inner_fences_are_left_alone() {
        let input = "{\"note\": \"```x```\"}";
        assert_eq!(strip_outer_fence(input), input);
    }
}
