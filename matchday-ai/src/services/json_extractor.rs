//! JSON extraction from the final turn
//!
//! Tolerates a markdown code fence around the payload. Anything that is not
//! strict JSON after fence removal is a `MalformedJson` failure carrying the
//! raw text; no repair is attempted.

use crate::models::{AnalysisFailure, AnalysisResult, ErrorKind};

const FENCE: &str = "```";

/// Parse the model's final output
pub fn extract(raw_text: &str) -> AnalysisResult {
    let payload = strip_code_fence(raw_text.trim()).trim();

    if payload.is_empty() {
        return AnalysisResult::Failure(
            AnalysisFailure::new(ErrorKind::EmptyOutput, "Model returned no JSON content")
                .with_raw_output(raw_text),
        );
    }

    match serde_json::from_str(payload) {
        Ok(value) => AnalysisResult::Success(value),
        Err(e) => AnalysisResult::Failure(
            AnalysisFailure::new(ErrorKind::MalformedJson, format!("Invalid JSON: {}", e))
                .with_raw_output(raw_text),
        ),
    }
}

/// Remove a surrounding ```` ```lang ... ``` ```` fence, if present
fn strip_code_fence(text: &str) -> &str {
    if text.len() < 2 * FENCE.len() || !text.starts_with(FENCE) || !text.ends_with(FENCE) {
        return text;
    }

    let inner = &text[FENCE.len()..text.len() - FENCE.len()];
    let tag_len = inner
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '+'))
        .unwrap_or(inner.len());
    let rest = &inner[tag_len..];

    // Only treat the leading word as a language tag when the payload follows it
    if tag_len > 0 && rest.starts_with(starts_payload) {
        return rest;
    }

    // A tag glued to a number (```json-12```) ends at the last letter
    let word_len = inner
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(inner.len());
    let number = &inner[word_len..];
    if word_len > 0 && number.starts_with(|c: char| c.is_ascii_digit() || c == '-') {
        number
    } else {
        inner
    }
}

fn starts_payload(c: char) -> bool {
    c.is_whitespace() || matches!(c, '{' | '[' | '"')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_json() {
        assert_eq!(extract(r#" {"a": 1} "#), AnalysisResult::Success(json!({"a": 1})));
    }

    #[test]
    fn test_fenced_json_with_language_tag() {
        let raw = "```json\n{\"events\": [{\"minute\": 10}]}\n```";
        assert_eq!(
            extract(raw),
            AnalysisResult::Success(json!({"events": [{"minute": 10}]}))
        );
    }

    #[test]
    fn test_fenced_json_without_tag() {
        assert_eq!(extract("```\n[1, 2]\n```"), AnalysisResult::Success(json!([1, 2])));
        assert_eq!(extract("```true```"), AnalysisResult::Success(json!(true)));
    }

    #[test]
    fn test_tag_directly_followed_by_payload() {
        assert_eq!(extract("```json\"text\"```"), AnalysisResult::Success(json!("text")));
        assert_eq!(extract("```json123```"), AnalysisResult::Success(json!(123)));
        assert_eq!(extract("```json-4.5```"), AnalysisResult::Success(json!(-4.5)));
        assert_eq!(extract("```json{\"a\": 1}```"), AnalysisResult::Success(json!({"a": 1})));
        assert_eq!(extract("```c++\n[0]\n```"), AnalysisResult::Success(json!([0])));
    }

    #[test]
    fn test_empty_output() {
        assert_eq!(extract("   ").error_kind(), Some(ErrorKind::EmptyOutput));
        assert_eq!(extract("```json\n\n```").error_kind(), Some(ErrorKind::EmptyOutput));
    }

    #[test]
    fn test_malformed_json_keeps_raw_text() {
        let raw = "```json\n{\"events\": [\n```";
        match extract(raw) {
            AnalysisResult::Failure(failure) => {
                assert_eq!(failure.kind, ErrorKind::MalformedJson);
                assert_eq!(failure.raw_output.as_deref(), Some(raw));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_json_is_stable() {
        let raw = "Sure! Here is the prediction: {oops}";
        assert_eq!(extract(raw), extract(raw));
        assert_eq!(extract(raw).error_kind(), Some(ErrorKind::MalformedJson));
    }

    #[test]
    fn test_unclosed_fence_is_not_repaired() {
        assert_eq!(
            extract("```json\n{\"a\": 1}").error_kind(),
            Some(ErrorKind::MalformedJson)
        );
    }
}
