//! # JSON Input Normalization
//!
//! Sample JSON pasted into the Add-metric form frequently arrives mangled:
//! copied out of a spreadsheet cell, wrapped in a Markdown fence, or wrapped in
//! an array. Normalization runs an ordered list of pure strategies; each one
//! proposes a candidate text and the first candidate that parses into an
//! object wins. Later strategies assume the earlier ones already failed.

use crate::errors::{EvalError, ValidationError};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use tracing::debug;

/// A named transformation producing a candidate text, or `None` when it does not apply.
struct Strategy {
    name: &'static str,
    prepare: fn(&str) -> Option<String>,
}

const STRATEGIES: &[Strategy] = &[
    Strategy {
        name: "as-is",
        prepare: as_is,
    },
    Strategy {
        name: "newline-collapse",
        prepare: newline_collapse,
    },
    Strategy {
        name: "sheets-backslash",
        prepare: sheets_backslash,
    },
    Strategy {
        name: "sheets-doubled-quotes",
        prepare: sheets_doubled_quotes,
    },
    Strategy {
        name: "cleanup",
        prepare: cleanup_only,
    },
];

fn newline_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[\r\n]+").expect("valid newline pattern"))
}

fn fence_open_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)^```(?:json)?\s*").expect("valid fence pattern"))
}

fn fence_close_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"```\s*$").expect("valid fence pattern"))
}

// --- Strategies ---

fn as_is(raw: &str) -> Option<String> {
    Some(raw.to_string())
}

fn newline_collapse(raw: &str) -> Option<String> {
    Some(newline_pattern().replace_all(raw, " ").into_owned())
}

fn sheets_backslash(raw: &str) -> Option<String> {
    let collapsed = newline_pattern().replace_all(raw, " ");
    if !(collapsed.starts_with('"') && collapsed.contains("\\\"")) {
        return None;
    }
    let inner = strip_outer_quotes(&collapsed);
    let unescaped = inner.replace("\\\"", "\"").replace("\\n", " ");
    Some(shared_cleanup(&unescaped))
}

fn sheets_doubled_quotes(raw: &str) -> Option<String> {
    let collapsed = newline_pattern().replace_all(raw, " ");
    if !(collapsed.len() >= 4 && collapsed.starts_with("\"\"") && collapsed.ends_with("\"\"")) {
        return None;
    }
    let unescaped = strip_outer_quotes(&collapsed).replace("\"\"", "\"");
    Some(shared_cleanup(strip_outer_quotes(&unescaped)))
}

fn cleanup_only(raw: &str) -> Option<String> {
    let collapsed = newline_pattern().replace_all(raw, " ");
    Some(shared_cleanup(&collapsed))
}

fn strip_outer_quotes(s: &str) -> &str {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// Strips Markdown fences, one pair of outer array brackets and stray trailing quotes.
fn shared_cleanup(s: &str) -> String {
    let s = fence_open_pattern().replace(s, "");
    let s = fence_close_pattern().replace(&s, "");
    let mut s = s.trim();

    if let Some(rest) = s.strip_prefix('[') {
        s = rest.trim_start();
    }
    if let Some(rest) = s.strip_suffix(']') {
        s = rest.trim_end();
    }
    let mut s = s.trim();

    while s.ends_with('"') && !s.ends_with("}\"") && !s.ends_with("\"\"") {
        s = s[..s.len() - 1].trim();
    }
    s.to_string()
}

// --- Dispatcher ---

fn into_object(value: Value) -> Result<Map<String, Value>, String> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Array(mut items) if items.len() == 1 && items[0].is_object() => {
            match items.pop() {
                Some(Value::Object(map)) => Ok(map),
                _ => Err(ValidationError::NotAnObject.to_string()),
            }
        }
        _ => Err(ValidationError::NotAnObject.to_string()),
    }
}

/// Normalizes pasted sample JSON into an object, removing any `chatId` key.
///
/// Valid JSON objects come back unchanged apart from the `chatId` removal.
pub fn normalize_template_json(raw: &str) -> Result<Map<String, Value>, EvalError> {
    let trimmed = raw.trim();
    let mut last_error = String::from("empty input");
    let mut last_attempt = trimmed.to_string();

    for strategy in STRATEGIES {
        let Some(candidate) = (strategy.prepare)(trimmed) else {
            continue;
        };
        let parsed = serde_json::from_str::<Value>(&candidate)
            .map_err(|e| e.to_string())
            .and_then(into_object);
        match parsed {
            Ok(mut object) => {
                debug!("Template JSON normalized with strategy '{}'", strategy.name);
                object.remove("chatId");
                return Ok(object);
            }
            Err(message) => {
                debug!("Normalization strategy '{}' failed: {message}", strategy.name);
                last_error = message;
                last_attempt = candidate;
            }
        }
    }

    Err(EvalError::TemplateParse {
        message: last_error,
        attempted: last_attempt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn normalized(raw: &str) -> Value {
        Value::Object(normalize_template_json(raw).unwrap())
    }

    #[test]
    fn valid_objects_are_unchanged_except_chat_id() {
        let samples = [
            json!({"a": true, "b": {"c": 1, "d": "x"}}),
            json!({"z": [1, 2], "a": null}),
            json!({"chatId": "123", "keep": "Text"}),
        ];
        for sample in samples {
            let mut expected = sample.clone();
            expected.as_object_mut().unwrap().remove("chatId");
            assert_eq!(normalized(&sample.to_string()), expected);
            assert_eq!(normalized(&serde_json::to_string_pretty(&sample).unwrap()), expected);
        }
    }

    #[test]
    fn preserves_key_order() {
        let raw = r#"{"zeta":1,"alpha":2}"#;
        let keys: Vec<_> = normalize_template_json(raw).unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }

    #[test]
    fn collapses_raw_newlines_inside_strings() {
        let raw = "{\"note\": \"line one\nline two\"}";
        assert_eq!(normalized(raw), json!({"note": "line one line two"}));
    }

    #[test]
    fn unwraps_backslash_escaped_sheet_cells() {
        let raw = r#""{\"A\": {\"ok\": true}}""#;
        assert_eq!(normalized(raw), json!({"A": {"ok": true}}));
    }

    #[test]
    fn unwraps_doubled_quote_sheet_cells() {
        let raw = r#"""{""A"": {""ok"": true}}"""#;
        assert_eq!(normalized(raw), json!({"A": {"ok": true}}));
    }

    #[test]
    fn strips_fences_and_single_element_arrays() {
        let fenced = "```json\n{\"a\": 1}\n```";
        assert_eq!(normalized(fenced), json!({"a": 1}));
        let bare = "```\n{\"a\": 2}\n```";
        assert_eq!(normalized(bare), json!({"a": 2}));
        assert_eq!(normalized(r#"[{"a": 1, "chatId": 9}]"#), json!({"a": 1}));
        assert_eq!(normalized("{\"a\": 1} \""), json!({"a": 1}));
    }

    #[test]
    fn reports_last_complaint_and_attempt() {
        let err = normalize_template_json("not json at all").unwrap_err();
        match err {
            EvalError::TemplateParse { attempted, .. } => assert_eq!(attempted, "not json at all"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(normalize_template_json("5").is_err());
        assert!(normalize_template_json("[1, 2]").is_err());
    }
}
