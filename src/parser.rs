//! Response Parser (C4): turns the final AI message's free text into a
//! [`StructuredResponse`], tolerating the ways models mangle JSON.
//!
//! Pure function, no side effects: a parse failure never panics, it just
//! returns `None` so the caller can degrade to a plain-text answer.

use serde_json::Value;

use crate::response_types::{ResponseType, StructuredResponse};

/// Try, in order: a direct parse, a fenced ```json``` block, a
/// brace-balanced scan, and finally a truncation repair of whichever of the
/// last two almost parsed. Returns the first candidate that both parses as
/// JSON and passes [`validate`].
pub fn parse_response(text: &str) -> Option<StructuredResponse> {
    if let Some(value) = try_direct(text) {
        if let Some(resp) = validate_and_build(value) {
            return Some(resp);
        }
    }

    let fenced = extract_fenced_block(text);
    if let Some(candidate) = &fenced {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            if let Some(resp) = validate_and_build(value) {
                return Some(resp);
            }
        }
    }

    let balanced = extract_balanced_braces(text);
    if let Some(candidate) = &balanced {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            if let Some(resp) = validate_and_build(value) {
                return Some(resp);
            }
        }
    }

    for candidate in [fenced, balanced].into_iter().flatten() {
        if let Some(repaired) = repair_truncated(&candidate) {
            if let Ok(value) = serde_json::from_str::<Value>(&repaired) {
                if let Some(resp) = validate_and_build(value) {
                    return Some(resp);
                }
            }
        }
    }

    log::warn!("response parser: no candidate produced a valid StructuredResponse");
    None
}

fn try_direct(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text.trim()).ok()
}

fn extract_fenced_block(text: &str) -> Option<String> {
    let re = regex::Regex::new(r"(?s)```json\s*(.*?)\s*```").ok()?;
    re.captures(text).map(|c| c[1].to_string())
}

/// Locate the first `{`, then scan forward tracking brace depth while
/// respecting string literals (so a `}` inside a quoted string doesn't
/// close early). Returns the slice once depth returns to zero, or the rest
/// of the text if depth never returns to zero (the reply was truncated
/// mid-object) — `repair_truncated` is what closes it back up.
fn extract_balanced_braces(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut end = None;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    end = Some(start + offset + 1);
                    break;
                }
            }
            _ => {}
        }
    }

    Some(text[start..end.unwrap_or(text.len())].to_string())
}

/// Best-effort repair for a response that was cut off mid-JSON: drop a
/// trailing comma, then close any unbalanced brackets/braces by counting
/// (not parsing) quote-respecting depth.
fn repair_truncated(candidate: &str) -> Option<String> {
    let mut repaired = candidate.trim_end().to_string();
    if repaired.ends_with(',') {
        repaired.pop();
    }

    let (open_brackets, close_brackets) = bracket_counts(&repaired, b'[', b']');
    let (open_braces, close_braces) = bracket_counts(&repaired, b'{', b'}');

    if open_brackets <= close_brackets && open_braces <= close_braces {
        return None;
    }

    for _ in close_brackets..open_brackets {
        repaired.push(']');
    }
    for _ in close_braces..open_braces {
        repaired.push('}');
    }
    Some(repaired)
}

fn bracket_counts(text: &str, open: u8, close: u8) -> (usize, usize) {
    let mut in_string = false;
    let mut escaped = false;
    let mut opens = 0;
    let mut closes = 0;
    for &byte in text.as_bytes() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        if byte == b'"' {
            in_string = true;
        } else if byte == open {
            opens += 1;
        } else if byte == close {
            closes += 1;
        }
    }
    (opens, closes)
}

/// Schema validation per spec: `response_type` one of the five literals,
/// `confidence` number or null, `data_summary` an object. Backfills
/// mechanical fields (`confidence_label`, `intent_understood`) the model
/// may have omitted so a structurally-valid-but-incomplete reply still
/// parses — `confidence_label` gets recomputed canonically by the caller
/// regardless of what's backfilled here.
fn validate_and_build(mut value: Value) -> Option<StructuredResponse> {
    let obj = value.as_object_mut()?;

    let response_type = obj.get("response_type")?.as_str()?;
    if ResponseType::from_str(response_type).is_none() {
        return None;
    }

    match obj.get("confidence") {
        None | Some(Value::Null) => {}
        Some(Value::Number(_)) => {}
        Some(_) => return None,
    }

    match obj.get("data_summary") {
        None => {
            obj.insert("data_summary".to_string(), Value::Object(serde_json::Map::new()));
        }
        Some(Value::Object(_)) => {}
        Some(_) => return None,
    }

    if !obj.contains_key("confidence_label") {
        obj.insert("confidence_label".to_string(), Value::String("unknown".to_string()));
    }
    if !obj.contains_key("intent_understood") {
        obj.insert("intent_understood".to_string(), Value::String(String::new()));
    }

    serde_json::from_value::<StructuredResponse>(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal(response_type: &str) -> String {
        format!(
            r#"{{"response_type":"{response_type}","confidence":0.9,"confidence_label":"high","intent_understood":"list accounts","data_summary":{{"count":3}}}}"#
        )
    }

    #[test]
    fn direct_parse_succeeds() {
        let resp = parse_response(&minimal("data_query")).unwrap();
        assert_eq!(resp.response_type, ResponseType::DataQuery);
    }

    #[test]
    fn fenced_block_is_extracted() {
        let text = format!("Here you go:\n```json\n{}\n```\nLet me know if that helps.", minimal("metadata_query"));
        let resp = parse_response(&text).unwrap();
        assert_eq!(resp.response_type, ResponseType::MetadataQuery);
    }

    #[test]
    fn balanced_braces_scan_ignores_braces_inside_strings() {
        let text = format!(
            r#"Some preamble {{not json}} then the real one: {}"#,
            minimal("field_details_query")
        );
        let resp = parse_response(&text).unwrap();
        assert_eq!(resp.response_type, ResponseType::FieldDetailsQuery);
    }

    #[test]
    fn truncated_json_is_repaired() {
        let truncated = r#"{"response_type":"data_query","confidence":0.7,"confidence_label":"medium","intent_understood":"x","data_summary":{"records":[1,2,"#;
        let resp = parse_response(truncated).unwrap();
        assert_eq!(resp.response_type, ResponseType::DataQuery);
    }

    #[test]
    fn invalid_response_type_fails_validation() {
        let text = r#"{"response_type":"not_a_type","data_summary":{}}"#;
        assert!(parse_response(text).is_none());
    }

    #[test]
    fn non_object_data_summary_fails_validation() {
        let text = r#"{"response_type":"data_query","data_summary":[1,2,3]}"#;
        assert!(parse_response(text).is_none());
    }

    #[test]
    fn garbage_text_returns_none() {
        assert!(parse_response("I couldn't find anything useful to say here.").is_none());
    }

    #[test]
    fn missing_confidence_label_and_intent_are_backfilled() {
        let text = r#"{"response_type":"data_query","data_summary":{}}"#;
        let resp = parse_response(text).unwrap();
        assert_eq!(resp.intent_understood, "");
    }
}
