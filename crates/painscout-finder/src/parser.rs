//! Recovery of JSON objects embedded in free-form model output.
//!
//! The ladder, tried in order until one rung yields an object:
//! 1. strict parse of the first object starting at the first `{`
//!    (trailing text of any kind is ignored);
//! 2. on the first-`{`-to-last-`}` span: strip trailing commas;
//! 3. normalize stray escape sequences;
//! 4. strip raw control characters (newline and tab survive, escaped when
//!    they sit inside a string);
//! 5. truncate at the last point where brace and bracket depth return to zero.
//!
//! When the whole document is beyond repair (typically an array cut off
//! mid-element), [`extract_array_elements`] and [`extract_keyed_objects`]
//! recover every complete sub-object independently.

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ParseError;

static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(\s*[\]}])").expect("valid trailing comma regex"));

/// Parse the first JSON object found in `raw`.
///
/// # Errors
///
/// Returns [`ParseError::NoStructuredOutputFound`] when no rung of the ladder
/// recovers a balanced object.
pub fn parse_object(raw: &str) -> Result<Value, ParseError> {
    let start = raw.find('{').ok_or(ParseError::NoStructuredOutputFound)?;
    let tail = &raw[start..];

    if let Some(value) = parse_leading_object(tail) {
        return Ok(value);
    }

    let end = tail.rfind('}').ok_or(ParseError::NoStructuredOutputFound)?;
    let mut candidate = tail[..=end].to_string();

    let repairs: [fn(&str) -> String; 3] =
        [strip_trailing_commas, normalize_escapes, strip_control_chars];
    for repair in repairs {
        candidate = repair(&candidate);
        if let Some(value) = parse_leading_object(&candidate) {
            return Ok(value);
        }
    }

    if let Some(prefix) = truncate_to_balanced(&candidate) {
        if let Some(value) = parse_leading_object(prefix) {
            tracing::debug!(
                kept_bytes = prefix.len(),
                total_bytes = candidate.len(),
                "recovered model output by depth-balanced truncation"
            );
            return Ok(value);
        }
    }

    Err(ParseError::NoStructuredOutputFound)
}

/// Parse the first JSON object in `raw` into `T`.
///
/// # Errors
///
/// [`ParseError::NoStructuredOutputFound`] if no object is recoverable,
/// [`ParseError::Shape`] if the object does not deserialize into `T`.
pub fn parse_as<T: DeserializeOwned>(raw: &str, context: &'static str) -> Result<T, ParseError> {
    let value = parse_object(raw)?;
    serde_json::from_value(value).map_err(|source| ParseError::Shape { context, source })
}

/// Every complete object element of the array under `"key": [...]`, in order.
///
/// Stops at the first element that is cut off, so a truncated array yields
/// the prefix of elements that were fully emitted.
#[must_use]
pub fn extract_array_elements(raw: &str, key: &str) -> Vec<Value> {
    let Some(re) = key_regex(key, '[') else {
        return Vec::new();
    };
    let Some(found) = re.find(raw) else {
        return Vec::new();
    };

    let mut elements = Vec::new();
    let mut pos = found.end();
    let bytes = raw.as_bytes();

    while pos < bytes.len() {
        match bytes[pos] {
            b' ' | b'\n' | b'\r' | b'\t' | b',' => pos += 1,
            b'{' => {
                let Some(end) = balanced_end(raw, pos) else {
                    break;
                };
                if let Some(value) = parse_fragment(&raw[pos..end]) {
                    elements.push(value);
                }
                pos = end;
            }
            _ => break,
        }
    }

    elements
}

/// Every complete object appearing as `"key": {...}` anywhere in `raw`.
#[must_use]
pub fn extract_keyed_objects(raw: &str, key: &str) -> Vec<Value> {
    let Some(re) = key_regex(key, '{') else {
        return Vec::new();
    };

    re.find_iter(raw)
        .filter_map(|m| {
            let open = m.end() - 1;
            let end = balanced_end(raw, open)?;
            parse_fragment(&raw[open..end])
        })
        .collect()
}

fn key_regex(key: &str, opener: char) -> Option<Regex> {
    let pattern = format!(r#""{}"\s*:\s*\{}"#, regex::escape(key), opener);
    Regex::new(&pattern).ok()
}

fn parse_fragment(fragment: &str) -> Option<Value> {
    parse_leading_object(fragment)
        .or_else(|| parse_leading_object(&strip_trailing_commas(fragment)))
        .or_else(|| parse_leading_object(&strip_control_chars(&normalize_escapes(fragment))))
}

/// Deserialize the first JSON value in `text` and keep it if it is an object.
///
/// Uses a streaming deserializer so any trailing text is ignored.
fn parse_leading_object(text: &str) -> Option<Value> {
    let mut stream = serde_json::Deserializer::from_str(text).into_iter::<Value>();
    match stream.next() {
        Some(Ok(value @ Value::Object(_))) => Some(value),
        _ => None,
    }
}

fn strip_trailing_commas(text: &str) -> String {
    TRAILING_COMMA.replace_all(text, "$1").into_owned()
}

/// Repair backslash sequences JSON does not allow inside strings.
///
/// `\'` becomes `'`; any other invalid escape keeps its character behind a
/// literal (escaped) backslash.
fn normalize_escapes(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        if !in_string {
            if ch == '"' {
                in_string = true;
            }
            out.push(ch);
            i += 1;
            continue;
        }

        match ch {
            '"' => {
                in_string = false;
                out.push(ch);
                i += 1;
            }
            '\\' => {
                let next = chars.get(i + 1).copied();
                match next {
                    Some('"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't') => {
                        out.push('\\');
                        out.extend(next);
                        i += 2;
                    }
                    Some('u') if is_unicode_escape(&chars[i + 2..]) => {
                        out.push('\\');
                        out.push('u');
                        i += 2;
                    }
                    Some('\'') => {
                        out.push('\'');
                        i += 2;
                    }
                    _ => {
                        out.push_str("\\\\");
                        i += 1;
                    }
                }
            }
            _ => {
                out.push(ch);
                i += 1;
            }
        }
    }

    out
}

fn is_unicode_escape(rest: &[char]) -> bool {
    rest.len() >= 4 && rest[..4].iter().all(char::is_ascii_hexdigit)
}

/// Drop raw control characters. Newlines and tabs are kept, escaped when they
/// appear inside a string literal.
fn strip_control_chars(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for ch in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
                if ch.is_control() {
                    // A backslash followed by a raw control char: drop both halves.
                    out.pop();
                } else {
                    out.push(ch);
                }
                continue;
            }
            match ch {
                '\\' => {
                    escaped = true;
                    out.push(ch);
                }
                '"' => {
                    in_string = false;
                    out.push(ch);
                }
                '\n' => out.push_str("\\n"),
                '\t' => out.push_str("\\t"),
                c if c.is_control() => {}
                c => out.push(c),
            }
        } else {
            match ch {
                '"' => {
                    in_string = true;
                    out.push(ch);
                }
                '\n' | '\t' => out.push(ch),
                c if c.is_control() => {}
                c => out.push(c),
            }
        }
    }

    out
}

/// Longest prefix of `text` that ends where brace and bracket depth both
/// return to zero, honoring string and escape state.
fn truncate_to_balanced(text: &str) -> Option<&str> {
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut last_zero = None;

    for (idx, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth -= 1;
                if depth < 0 {
                    break;
                }
                if depth == 0 {
                    last_zero = Some(idx + ch.len_utf8());
                }
            }
            _ => {}
        }
    }

    last_zero.map(|end| &text[..end])
}

/// Byte index just past the bracket matching the one at `open`.
fn balanced_end(text: &str, open: usize) -> Option<usize> {
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[open..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset + ch.len_utf8());
                }
                if depth < 0 {
                    return None;
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_clean_object() {
        let value = parse_object(r#"{"a": 1, "b": [true, null]}"#).unwrap();
        assert_eq!(value, json!({"a": 1, "b": [true, null]}));
    }

    #[test]
    fn serialized_values_round_trip() {
        let samples = [
            json!({}),
            json!({"text": "quotes \" and \\ and {braces} and [brackets]"}),
            json!({"nested": {"list": [1, 2.5, -3, {"deep": "é✓"}]}, "flag": false}),
            json!({"tweets": [{"id": "1", "metrics": {"replies": 4}}]}),
        ];
        for sample in samples {
            let serialized = serde_json::to_string(&sample).unwrap();
            assert_eq!(parse_object(&serialized).unwrap(), sample);
            let pretty = serde_json::to_string_pretty(&sample).unwrap();
            assert_eq!(parse_object(&pretty).unwrap(), sample);
        }
    }

    #[test]
    fn ignores_prose_and_code_fences() {
        let raw = "Sure! Here you go:\n```json\n{\"topicKeywords\": [\"pricing\"]}\n```\nLet me know.";
        let value = parse_object(raw).unwrap();
        assert_eq!(value["topicKeywords"][0], "pricing");
    }

    #[test]
    fn extra_trailing_text_with_braces_is_ignored() {
        let raw = r#"{"a": 1} and then {"b": "#;
        assert_eq!(parse_object(raw).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn repairs_trailing_commas() {
        let raw = r#"{"a": [1, 2, ], "b": {"c": 3,},}"#;
        assert_eq!(
            parse_object(raw).unwrap(),
            json!({"a": [1, 2], "b": {"c": 3}})
        );
    }

    #[test]
    fn repairs_stray_escapes() {
        let raw = r#"{"text": "it\'s broken \d again", "ok": "é"}"#;
        let value = parse_object(raw).unwrap();
        assert_eq!(value["text"], "it's broken \\d again");
        assert_eq!(value["ok"], "é");
    }

    #[test]
    fn repairs_raw_control_characters() {
        let raw = "{\"text\": \"line one\nline two\u{7}\tend\"}";
        let value = parse_object(raw).unwrap();
        assert_eq!(value["text"], "line one\nline two\tend");
    }

    #[test]
    fn truncation_finds_last_balanced_point() {
        let text = r#"{"a": {"b": "}"}}, "c": ["#;
        assert_eq!(truncate_to_balanced(text), Some(r#"{"a": {"b": "}"}}"#));
        assert_eq!(truncate_to_balanced(r#"{"open": ["#), None);
    }

    #[test]
    fn fails_without_any_object() {
        assert!(matches!(
            parse_object("no json here, sorry"),
            Err(ParseError::NoStructuredOutputFound)
        ));
        assert!(matches!(
            parse_object(r#"{"never": "closed""#),
            Err(ParseError::NoStructuredOutputFound)
        ));
        assert!(parse_object("[1, 2, 3]").is_err());
    }

    #[test]
    fn truncated_array_yields_complete_prefix() {
        let raw = r#"{"tweets": [
            {"id": "1", "text": "first"},
            {"id": "2", "text": "second, with a } inside"},
            {"id": "3", "text": "thi"#;
        assert!(parse_object(raw).is_err());

        let elements = extract_array_elements(raw, "tweets");
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0]["id"], "1");
        assert_eq!(elements[1]["text"], "second, with a } inside");
    }

    #[test]
    fn array_elements_tolerate_trailing_commas_inside_elements() {
        let raw = r#"{"results": [{"key": "a", "isPain": true,}, {"key": "b", "isPain": false}]}"#;
        let elements = extract_array_elements(raw, "results");
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0]["isPain"], true);
    }

    #[test]
    fn missing_array_key_yields_nothing() {
        assert!(extract_array_elements(r#"{"other": []}"#, "tweets").is_empty());
    }

    #[test]
    fn keyed_objects_are_extracted_independently() {
        let raw = r#"garbage "tweet": {"id": "10", "text": "a"} more "tweet" : {"id": "11", "text": "b"}
            "tweets": [] "tweet": {"id": "12", "text": "cut"#;
        let objects = extract_keyed_objects(raw, "tweet");
        let ids: Vec<&str> = objects.iter().filter_map(|o| o["id"].as_str()).collect();
        assert_eq!(ids, vec!["10", "11"]);
    }

    #[test]
    fn parse_as_reports_shape_errors() {
        #[derive(Debug, serde::Deserialize)]
        struct Expected {
            #[allow(dead_code)]
            count: u32,
        }
        let err = parse_as::<Expected>(r#"{"count": "many"}"#, "test").unwrap_err();
        assert!(matches!(err, ParseError::Shape { context: "test", .. }));
    }
}
