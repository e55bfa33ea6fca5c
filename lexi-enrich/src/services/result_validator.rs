//! Backend response validation and mechanical repair
//!
//! The backend is asked for JSON but regularly returns it truncated or with
//! trailing commas. This module classifies what is wrong with a payload,
//! repairs the small mechanical cases (a couple of missing closers, stray
//! commas), and checks the top-level shape before item-level validation.
//! It never guesses at truncated field values.

use crate::error::EnrichError;
use serde_json::{Map, Value};
use std::fmt;

/// Maximum number of missing closing tokens `repair` will supply
pub const MAX_REPAIRABLE_CLOSERS: usize = 2;

/// Keys under which the backend may wrap its record array
const RECORD_CONTAINER_KEYS: &[&str] = &["words", "items", "results", "data", "entries"];

/// One detected defect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    /// Empty or whitespace-only payload
    Empty,
    /// Nothing but opening braces/brackets
    BareOpener,
    /// Opening tokens never closed
    MissingClosers { braces: usize, brackets: usize },
    /// Closing token does not match the innermost open token
    MismatchedCloser { position: usize },
    /// Closing token with nothing open
    UnexpectedCloser { position: usize },
    /// Comma right before a closer or at the very end
    TrailingComma,
    /// Payload ends inside a string literal
    UnterminatedString,
    /// Payload ends right after a key or value separator
    DanglingToken,
    /// Underlying JSON parser rejected the payload
    ParseError(String),
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::Empty => write!(f, "empty payload"),
            ValidationIssue::BareOpener => write!(f, "payload is only an opening brace/bracket"),
            ValidationIssue::MissingClosers { braces, brackets } => write!(
                f,
                "unbalanced payload: {} unclosed brace(s), {} unclosed bracket(s)",
                braces, brackets
            ),
            ValidationIssue::MismatchedCloser { position } => {
                write!(f, "mismatched closing token at byte {}", position)
            }
            ValidationIssue::UnexpectedCloser { position } => {
                write!(f, "unexpected closing token at byte {}", position)
            }
            ValidationIssue::TrailingComma => write!(f, "trailing comma"),
            ValidationIssue::UnterminatedString => write!(f, "unterminated string at end of payload"),
            ValidationIssue::DanglingToken => write!(f, "payload ends after a separator"),
            ValidationIssue::ParseError(msg) => write!(f, "JSON parse error: {}", msg),
        }
    }
}

/// Outcome of [`ResultValidator::validate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub ok: bool,
    pub issues: Vec<ValidationIssue>,
    /// Only meaningful when `ok` is false
    pub repairable: bool,
}

impl ValidationReport {
    fn valid() -> Self {
        Self {
            ok: true,
            issues: Vec::new(),
            repairable: false,
        }
    }

    fn invalid(issues: Vec<ValidationIssue>, repairable: bool) -> Self {
        Self {
            ok: false,
            issues,
            repairable,
        }
    }

    /// Issues as human-readable strings
    pub fn issue_messages(&self) -> Vec<String> {
        self.issues.iter().map(ToString::to_string).collect()
    }

    /// One-line description for logs and error messages
    pub fn summary(&self) -> String {
        if self.ok {
            "valid".to_string()
        } else {
            self.issue_messages().join("; ")
        }
    }
}

/// Structural scan of a payload, string-literal aware
#[derive(Debug, Default)]
struct Scan {
    stack: Vec<char>,
    in_string: bool,
    mismatched_at: Option<usize>,
    unexpected_at: Option<usize>,
    comma_before_closer: bool,
    last_significant: Option<char>,
}

impl Scan {
    fn run(payload: &str) -> Self {
        let mut scan = Scan::default();
        let mut escaped = false;

        for (pos, c) in payload.char_indices() {
            if scan.in_string {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    scan.in_string = false;
                    scan.last_significant = Some('"');
                }
                continue;
            }

            match c {
                '"' => scan.in_string = true,
                '{' | '[' => scan.stack.push(c),
                '}' | ']' => {
                    if scan.last_significant == Some(',') {
                        scan.comma_before_closer = true;
                    }
                    match scan.stack.pop() {
                        Some(open) if closer_for(open) == c => {}
                        Some(_) => {
                            scan.mismatched_at.get_or_insert(pos);
                        }
                        None => {
                            scan.unexpected_at.get_or_insert(pos);
                        }
                    }
                }
                _ => {}
            }

            if !c.is_whitespace() && c != '"' {
                scan.last_significant = Some(c);
            }
        }

        scan
    }

    fn missing(&self) -> (usize, usize) {
        let braces = self.stack.iter().filter(|&&c| c == '{').count();
        (braces, self.stack.len() - braces)
    }
}

fn closer_for(open: char) -> char {
    if open == '{' {
        '}'
    } else {
        ']'
    }
}

/// Remove a trailing comma (and the whitespace after it) from `out`
fn strip_trailing_comma(out: &mut String) {
    let trimmed_len = out.trim_end().len();
    if out[..trimmed_len].ends_with(',') {
        out.truncate(trimmed_len - 1);
    } else {
        out.truncate(trimmed_len);
    }
}

/// Strip a surrounding markdown code fence, if any
pub fn unwrap_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string ("json") on the opening fence line
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// Response validator service
#[derive(Debug, Clone, Default)]
pub struct ResultValidator;

impl ResultValidator {
    pub fn new() -> Self {
        Self
    }

    /// Classify defects in a raw payload
    pub fn validate(&self, raw: &str) -> ValidationReport {
        let payload = unwrap_code_fence(raw);

        if payload.is_empty() {
            return ValidationReport::invalid(vec![ValidationIssue::Empty], false);
        }

        if payload.chars().filter(|c| !c.is_whitespace()).all(|c| c == '{' || c == '[') {
            return ValidationReport::invalid(vec![ValidationIssue::BareOpener], false);
        }

        let parse_error = match serde_json::from_str::<Value>(payload) {
            Ok(_) => return ValidationReport::valid(),
            Err(e) => e.to_string(),
        };

        let scan = Scan::run(payload);
        let mut issues = Vec::new();
        let mut mechanical = true;

        if scan.in_string {
            issues.push(ValidationIssue::UnterminatedString);
            mechanical = false;
        }
        if let Some(position) = scan.mismatched_at {
            issues.push(ValidationIssue::MismatchedCloser { position });
            mechanical = false;
        }
        if let Some(position) = scan.unexpected_at {
            issues.push(ValidationIssue::UnexpectedCloser { position });
            mechanical = false;
        }

        let (braces, brackets) = scan.missing();
        if braces + brackets > 0 {
            issues.push(ValidationIssue::MissingClosers { braces, brackets });
            if braces + brackets > MAX_REPAIRABLE_CLOSERS {
                mechanical = false;
            }
        }

        if !scan.in_string {
            match scan.last_significant {
                Some(',') => issues.push(ValidationIssue::TrailingComma),
                Some(':') => {
                    issues.push(ValidationIssue::DanglingToken);
                    mechanical = false;
                }
                _ if scan.comma_before_closer => issues.push(ValidationIssue::TrailingComma),
                _ => {}
            }
        }

        if issues.is_empty() {
            // Structurally balanced but still unparseable: semantic damage
            issues.push(ValidationIssue::ParseError(parse_error));
            return ValidationReport::invalid(issues, false);
        }

        let repairable = mechanical && serde_json::from_str::<Value>(&self.repair(raw)).is_ok();
        if !repairable {
            issues.push(ValidationIssue::ParseError(parse_error));
        }

        ValidationReport::invalid(issues, repairable)
    }

    /// Mechanically repair a payload
    ///
    /// Strips trailing commas before closing tokens and at the end, drops an
    /// array element that was opened but never filled, then appends the
    /// missing closers innermost-first. Only meaningful when
    /// [`validate`](Self::validate) reported `repairable`.
    pub fn repair(&self, raw: &str) -> String {
        let payload = unwrap_code_fence(raw);
        let mut out = String::with_capacity(payload.len() + MAX_REPAIRABLE_CLOSERS);
        let mut stack: Vec<char> = Vec::new();
        let mut in_string = false;
        let mut escaped = false;

        for c in payload.chars() {
            if in_string {
                out.push(c);
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    in_string = false;
                }
                continue;
            }

            match c {
                '"' => in_string = true,
                '{' | '[' => stack.push(c),
                '}' | ']' => {
                    strip_trailing_comma(&mut out);
                    stack.pop();
                }
                _ => {}
            }
            out.push(c);
        }

        if !in_string {
            strip_trailing_comma(&mut out);

            // An element opened right before the cut has no content; drop it
            // instead of closing it into an empty record
            while let Some(&open) = stack.last() {
                let Some(before) = out.strip_suffix(open) else {
                    break;
                };
                let before = before.trim_end();
                if !(before.ends_with(',') || before.ends_with('[')) {
                    break;
                }
                let keep = before.len();
                out.truncate(keep);
                stack.pop();
                strip_trailing_comma(&mut out);
            }
        }
        for open in stack.iter().rev() {
            out.push(closer_for(*open));
        }

        out
    }

    /// Validate, repair if possible, and parse
    pub fn parse_value(&self, raw: &str) -> Result<Value, EnrichError> {
        let report = self.validate(raw);

        let text = if report.ok {
            unwrap_code_fence(raw).to_string()
        } else if report.repairable {
            tracing::debug!(issues = %report.summary(), "Repairing backend response");
            self.repair(raw)
        } else {
            tracing::warn!(
                issues = %report.summary(),
                payload_len = raw.len(),
                "Backend response is not repairable"
            );
            return Err(EnrichError::MalformedResponse(report.summary()));
        };

        serde_json::from_str(&text).map_err(|e| EnrichError::MalformedResponse(e.to_string()))
    }

    /// Validate a response and return its per-item records
    ///
    /// Accepted shapes: an array of objects, an object wrapping one array of
    /// objects, or a single record object.
    pub fn parse_records(&self, raw: &str) -> Result<Vec<Value>, EnrichError> {
        extract_records(self.parse_value(raw)?)
    }
}

fn all_objects(items: &[Value]) -> bool {
    items.iter().all(Value::is_object)
}

fn looks_like_record(map: &Map<String, Value>) -> bool {
    map.contains_key("translation") || map.contains_key("pronunciation")
}

fn extract_records(value: Value) -> Result<Vec<Value>, EnrichError> {
    match value {
        Value::Array(items) if all_objects(&items) => Ok(items),
        Value::Array(_) => Err(EnrichError::MalformedResponse(
            "top-level array holds non-object entries".to_string(),
        )),
        Value::Object(mut map) => {
            let container = RECORD_CONTAINER_KEYS
                .iter()
                .find(|key| matches!(map.get(**key), Some(Value::Array(_))))
                .map(|key| key.to_string())
                .or_else(|| {
                    let mut arrays = map.iter().filter(|(_, v)| v.is_array());
                    match (arrays.next(), arrays.next()) {
                        (Some((key, _)), None) => Some(key.clone()),
                        _ => None,
                    }
                });

            match container.and_then(|key| map.remove(&key)) {
                Some(Value::Array(items)) if all_objects(&items) => Ok(items),
                Some(_) => Err(EnrichError::MalformedResponse(
                    "record container holds non-object entries".to_string(),
                )),
                None if looks_like_record(&map) => Ok(vec![Value::Object(map)]),
                None => Err(EnrichError::MalformedResponse(
                    "unexpected top-level shape: no record array".to_string(),
                )),
            }
        }
        other => Err(EnrichError::MalformedResponse(format!(
            "unexpected top-level JSON type: {}",
            match other {
                Value::Null => "null",
                Value::Bool(_) => "boolean",
                Value::Number(_) => "number",
                _ => "string",
            }
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> ResultValidator {
        ResultValidator::new()
    }

    #[test]
    fn test_valid_payload() {
        let report = validator().validate(r#"{"words": [{"translation": "x"}]}"#);
        assert!(report.ok);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_lone_brace_is_not_repairable() {
        let report = validator().validate("{");
        assert!(!report.ok);
        assert!(!report.repairable);
        assert_eq!(report.issues, vec![ValidationIssue::BareOpener]);

        assert!(!validator().validate("  [ ").repairable);
    }

    #[test]
    fn test_empty_payload() {
        let report = validator().validate("  \n ");
        assert_eq!(report.issues, vec![ValidationIssue::Empty]);
        assert!(!report.repairable);
        assert!(matches!(
            validator().parse_records(""),
            Err(EnrichError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_two_missing_closers_repaired() {
        let raw = r#"{"words": [{"word": "a", "translation": "x"}, {"word": "b", "translation": "y"}"#;
        let report = validator().validate(raw);

        assert!(!report.ok);
        assert!(report.repairable);
        assert!(report
            .issues
            .contains(&ValidationIssue::MissingClosers { braces: 1, brackets: 1 }));

        let repaired = validator().repair(raw);
        assert!(repaired.ends_with("}]}"));
        assert_eq!(validator().parse_records(raw).unwrap().len(), 2);
    }

    #[test]
    fn test_truncated_after_comma_repaired() {
        let raw = "[{\"word\": \"a\"}, {\"word\": \"b\"},\n";
        let report = validator().validate(raw);

        assert!(report.repairable);
        assert!(report.issues.contains(&ValidationIssue::TrailingComma));
        assert_eq!(validator().repair(raw), r#"[{"word": "a"}, {"word": "b"}]"#);
        assert_eq!(validator().parse_records(raw).unwrap().len(), 2);
    }

    #[test]
    fn test_truncated_after_new_record_opened() {
        let raw = r#"[{"word":"a","pronunciation":"p","translation":"x"}, {"#;
        let report = validator().validate(raw);

        assert!(report.repairable);
        assert_eq!(
            validator().repair(raw),
            r#"[{"word":"a","pronunciation":"p","translation":"x"}]"#
        );
        let records = validator().parse_records(raw).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["word"], "a");
    }

    #[test]
    fn test_wrapped_array_truncated_after_opener() {
        let raw = "{\"words\": [{\"word\": \"a\", \"translation\": \"x\"},\n  {";
        assert_eq!(
            validator().repair(raw),
            r#"{"words": [{"word": "a", "translation": "x"}]}"#
        );

        // Three open tokens at the cut is over the closer limit
        assert!(!validator().validate(raw).repairable);
    }

    #[test]
    fn test_trailing_comma_before_closer() {
        let raw = r#"{"words": [{"word": "a", "translation": "x",}, ]}"#;
        let report = validator().validate(raw);

        assert!(report.repairable);
        assert_eq!(report.issues, vec![ValidationIssue::TrailingComma]);
        assert_eq!(
            validator().repair(raw),
            r#"{"words": [{"word": "a", "translation": "x"}]}"#
        );
    }

    #[test]
    fn test_three_missing_closers_not_repairable() {
        let raw = r#"{"words": [{"word": "a", "examples": [{"sentence": "s"}"#;
        let report = validator().validate(raw);
        assert!(!report.repairable);
    }

    #[test]
    fn test_unterminated_string_not_repairable() {
        let raw = r#"[{"word": "a", "translation": "hou"#;
        let report = validator().validate(raw);

        assert!(!report.repairable);
        assert!(report.issues.contains(&ValidationIssue::UnterminatedString));
    }

    #[test]
    fn test_dangling_key_not_repairable() {
        let report = validator().validate(r#"[{"word": "a", "translation":"#);
        assert!(!report.repairable);
        assert!(report.issues.contains(&ValidationIssue::DanglingToken));
    }

    #[test]
    fn test_brackets_inside_strings_ignored() {
        let raw = r#"[{"word": "a}]\"[", "translation": "x"}"#;
        let report = validator().validate(raw);

        assert!(report.repairable);
        assert_eq!(
            report.issues,
            vec![ValidationIssue::MissingClosers { braces: 0, brackets: 1 }]
        );
        let records = validator().parse_records(raw).unwrap();
        assert_eq!(records[0]["word"], "a}]\"[");
    }

    #[test]
    fn test_mismatched_closer() {
        let report = validator().validate(r#"[{"word": "a"]"#);
        assert!(!report.repairable);
        assert!(matches!(report.issues[0], ValidationIssue::MismatchedCloser { .. }));
    }

    #[test]
    fn test_semantic_garbage_is_parse_error() {
        let report = validator().validate("[{word: a}]");
        assert!(!report.repairable);
        assert!(matches!(report.issues[0], ValidationIssue::ParseError(_)));
        assert!(report.summary().contains("JSON parse error"));
    }

    #[test]
    fn test_code_fence_unwrapped() {
        let raw = "```json\n[{\"translation\": \"x\", \"pronunciation\": \"y\"}]\n```";
        assert!(validator().validate(raw).ok);
        assert_eq!(validator().parse_records(raw).unwrap().len(), 1);
        assert_eq!(unwrap_code_fence("```[1]```"), "[1]");
    }

    #[test]
    fn test_shape_checks() {
        let v = validator();
        assert_eq!(v.parse_records(r#"{"results": [{"a": 1}, {"b": 2}]}"#).unwrap().len(), 2);
        assert_eq!(v.parse_records(r#"{"vocab": [{"a": 1}], "note": "x"}"#).unwrap().len(), 1);
        assert_eq!(
            v.parse_records(r#"{"translation": "x", "pronunciation": "y"}"#).unwrap().len(),
            1
        );
        assert!(v.parse_records("[]").unwrap().is_empty());
        assert!(v.parse_records(r#"["a", "b"]"#).is_err());
        assert!(v.parse_records(r#"{"status": "ok"}"#).is_err());
        assert!(v.parse_records("42").is_err());
    }
}
