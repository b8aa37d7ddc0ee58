//! Annotation Extractor
//!
//! Finds the marker token inside a comment span and pulls out the balanced
//! JSON object that follows it. Brace matching is string and escape aware, so
//! `"}"` inside a value does not close the payload.

use std::collections::HashMap;

use serde_json::Value;

use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::locator::CommentSpan;
use crate::source::LineIndex;

/// Marker token used when none is configured.
pub const DEFAULT_MARKER: &str = "@ai-metadata";

/// A parsed annotation payload and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationPayload {
    /// Parsed value tree (always an object)
    pub value: Value,
    /// File byte range of the payload, `{` through `}` inclusive
    pub start: usize,
    pub end: usize,
    pub marker_line: usize,
    pub marker_column: usize,
    /// File positions of the top-level keys
    keys: HashMap<String, (usize, usize)>,
}

impl AnnotationPayload {
    /// Position of a top-level key, falling back to the marker.
    pub fn position_of(&self, key: &str) -> (usize, usize) {
        self.keys
            .get(key)
            .copied()
            .unwrap_or((self.marker_line, self.marker_column))
    }

    pub fn marker_position(&self) -> (usize, usize) {
        (self.marker_line, self.marker_column)
    }

    /// Build a payload from an already parsed value, located at the marker.
    pub fn from_value(value: Value, marker_line: usize, marker_column: usize) -> Self {
        Self {
            value,
            start: 0,
            end: 0,
            marker_line,
            marker_column,
            keys: HashMap::new(),
        }
    }
}

/// Extract the payload following `marker` in `span`.
///
/// Returns `Ok(None)` when the span carries no marker. Only the first marker
/// in a span is considered. Errors are returned as an `ExtractorError`
/// diagnostic so the caller can record it and move on to the next span.
pub fn extract(
    span: &CommentSpan,
    lines: &LineIndex,
    marker: &str,
    path: &str,
) -> Result<Option<AnnotationPayload>, Diagnostic> {
    if marker.is_empty() {
        return Ok(None);
    }
    let Some(marker_at) = span.body.find(marker) else {
        return Ok(None);
    };
    let (marker_line, marker_column) = lines.position(span.file_offset(marker_at));
    let error = |message: String, line: usize, column: usize| {
        Diagnostic::new(DiagnosticCode::ExtractorError, message, path, line, column)
    };

    let after = marker_at + marker.len();
    let Some(open) = span.body[after..].find('{').map(|idx| after + idx) else {
        return Err(error(
            format!("missing payload after `{marker}`"),
            marker_line,
            marker_column,
        ));
    };
    let Some(close) = matching_brace(span.body.as_bytes(), open) else {
        return Err(error(
            format!("unterminated payload after `{marker}`: braces are not balanced"),
            marker_line,
            marker_column,
        ));
    };

    let raw = &span.body[open..=close];
    let payload_start = span.file_offset(open);
    let value: Value = serde_json::from_str(raw).map_err(|e| {
        let offset = payload_start + offset_in(raw, e.line(), e.column());
        let (line, column) = lines.position(offset);
        let message = e.to_string();
        let message = message
            .split(" at line ")
            .next()
            .unwrap_or(message.as_str())
            .to_string();
        error(format!("invalid payload: {message}"), line, column)
    })?;

    let keys = top_level_keys(raw)
        .into_iter()
        .map(|(key, at)| (key, lines.position(payload_start + at)))
        .collect();

    Ok(Some(AnnotationPayload {
        value,
        start: payload_start,
        end: span.file_offset(close) + 1,
        marker_line,
        marker_column,
        keys,
    }))
}

/// Index of the bracket closing the one at `open`, or `None` if input ends first.
fn matching_brace(text: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, &b) in text.iter().enumerate().skip(open) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

/// Byte offset inside `text` of a 1-based (line, column) from serde_json.
fn offset_in(text: &str, line: usize, column: usize) -> usize {
    let line_start = if line <= 1 {
        0
    } else {
        text.match_indices('\n')
            .nth(line - 2)
            .map_or(text.len(), |(idx, _)| idx + 1)
    };
    (line_start + column.saturating_sub(1)).min(text.len())
}

/// Top-level object keys with their byte offsets inside `raw`.
fn top_level_keys(raw: &str) -> Vec<(String, usize)> {
    let bytes = raw.as_bytes();
    let mut keys = Vec::new();
    let mut depth = 0usize;
    let mut expect_key = false;
    let mut idx = 0;
    while idx < bytes.len() {
        match bytes[idx] {
            b'"' => {
                let start = idx;
                idx += 1;
                while idx < bytes.len() && bytes[idx] != b'"' {
                    idx += if bytes[idx] == b'\\' { 2 } else { 1 };
                }
                let end = idx.min(bytes.len().saturating_sub(1));
                if depth == 1 && expect_key {
                    if let Ok(key) = serde_json::from_str::<String>(&raw[start..=end]) {
                        keys.push((key, start));
                    }
                    expect_key = false;
                }
            }
            b'{' | b'[' => {
                depth += 1;
                if depth == 1 {
                    expect_key = true;
                }
            }
            b'}' | b']' => depth = depth.saturating_sub(1),
            b',' if depth == 1 => expect_key = true,
            _ => {}
        }
        idx += 1;
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::LanguageProfile;
    use crate::locator::locate;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn extract_first(
        source: &str,
        profile: &LanguageProfile,
    ) -> Result<Option<AnnotationPayload>, Diagnostic> {
        let lines = LineIndex::new(source);
        let span = locate(source, profile).next().unwrap();
        extract(&span, &lines, DEFAULT_MARKER, "src/a.rs")
    }

    // ========================================================================
    // Extraction Tests
    // ========================================================================

    #[test]
    fn test_no_marker_is_not_an_error() {
        let result = extract_first("// just a comment\n", &LanguageProfile::rust());
        assert_eq!(result, Ok(None));
    }

    #[test]
    fn test_multiline_line_comment_payload() {
        let source = "\
// @ai-metadata {
//   \"domain\": \"billing\",
//   \"tags\": [\"a\", \"}\"]
// }
fn charge() {}
";
        let payload = extract_first(source, &LanguageProfile::rust()).unwrap().unwrap();
        assert_eq!(
            payload.value,
            json!({"domain": "billing", "tags": ["a", "}"]})
        );
        assert_eq!(payload.marker_position(), (1, 4));
        assert_eq!(payload.position_of("tags"), (3, 6));
        assert_eq!(payload.position_of("missing"), (1, 4));
    }

    #[test]
    fn test_block_comment_payload_with_stars() {
        let source = "/**\n * @ai-metadata {\n *   \"owner\": \"team-a\"\n * }\n */\nclass A {}\n";
        let payload = extract_first(source, &LanguageProfile::java()).unwrap().unwrap();
        assert_eq!(payload.value, json!({"owner": "team-a"}));
        assert_eq!(payload.marker_position(), (2, 4));
    }

    #[test]
    fn test_unbalanced_payload_reports_marker_line() {
        let source = "\n\n# @ai-metadata {\"domain\": \"x\"\n";
        let err = extract_first(source, &LanguageProfile::python()).unwrap_err();
        assert_eq!(err.code, DiagnosticCode::ExtractorError);
        assert_eq!(err.line, 3);
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn test_missing_payload() {
        let err = extract_first("// @ai-metadata none here\n", &LanguageProfile::go()).unwrap_err();
        assert!(err.message.contains("missing payload"));
        assert_eq!((err.line, err.column), (1, 4));
    }

    #[test]
    fn test_syntax_error_position_is_translated() {
        let source = "\
x = 1
# @ai-metadata {
#   \"domain\": \"auth\",
# }
";
        let err = extract_first(source, &LanguageProfile::python()).unwrap_err();
        assert_eq!(err.code, DiagnosticCode::ExtractorError);
        assert!(err.message.starts_with("invalid payload"));
        assert!(!err.message.contains("at line"));
        assert_eq!(err.line, 4);
    }

    #[test]
    fn test_only_first_marker_is_used() {
        let source = "// @ai-metadata {\"a\": 1} @ai-metadata {\"b\": 2}\n";
        let payload = extract_first(source, &LanguageProfile::rust()).unwrap().unwrap();
        assert_eq!(payload.value, json!({"a": 1}));
    }

    // ========================================================================
    // Helper Tests
    // ========================================================================

    #[test]
    fn test_matching_brace_ignores_escaped_quotes() {
        let text = br#"{"a": "x\"}", "b": {}}"#;
        assert_eq!(matching_brace(text, 0), Some(text.len() - 1));
        assert_eq!(matching_brace(b"{\"a\": [1, 2}", 0), None);
    }

    #[test]
    fn test_top_level_keys_skip_nested() {
        let raw = r#"{"a": {"inner": 1}, "b": ["c"], "d\"e": 2}"#;
        let keys: Vec<String> = top_level_keys(raw).into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b", "d\"e"]);
    }

    #[test]
    fn test_offset_in() {
        let text = "{\n  \"a\": ,\n}";
        assert_eq!(offset_in(text, 1, 1), 0);
        assert_eq!(offset_in(text, 2, 8), 9);
        assert_eq!(offset_in(text, 9, 9), text.len());
    }
}
