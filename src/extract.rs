//! Best-effort recovery of a JSON object from raw model output.
//!
//! Models asked to reply with a single JSON object routinely wrap it in
//! prose or markdown fences, truncate it mid-object, leave trailing commas,
//! or emit argument lists as bare tokens. The scanner here tolerates all of
//! that: it always returns syntactically valid JSON text, falling back to
//! `{}` when nothing salvageable is found.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(\s*[}\]])").unwrap());
static BARE_ARGS_ARRAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""args":\s*\[([^\]]*)\]"#).unwrap());
static STRING_ARGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""args":\s*"([^"]*)""#).unwrap());

/// Extracts the first complete JSON object from `raw`, repairing common
/// model mistakes along the way. Infallible: malformed input degrades to
/// `"{}"`, which callers treat as "no actionable tool call".
pub fn extract_json(raw: &str) -> String {
    let repaired = fix_args_field(raw);
    let trimmed = repaired.trim();

    let Some(start) = trimmed.find('{') else {
        return "{}".to_string();
    };
    let source = &trimmed[start..];

    let mut scanned = String::with_capacity(source.len());
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in source.chars() {
        if escaped {
            escaped = false;
            scanned.push(c);
            continue;
        }
        if c == '\\' {
            escaped = true;
            scanned.push(c);
            continue;
        }
        if c == '"' {
            in_string = !in_string;
        }

        if !in_string {
            match c {
                '{' | '[' => stack.push(c),
                // Mismatched closers are dropped rather than treated as
                // fatal; the input is untrusted.
                '}' => {
                    if stack.last() == Some(&'{') {
                        stack.pop();
                    } else {
                        continue;
                    }
                }
                ']' => {
                    if stack.last() == Some(&'[') {
                        stack.pop();
                    } else {
                        continue;
                    }
                }
                _ => {}
            }
        }

        scanned.push(c);

        // Depth back to zero: we may be holding the first complete object,
        // even if garbage text follows.
        if stack.is_empty() && !in_string && c == '}' {
            let candidate = strip_trailing_commas(&scanned);
            if parses_as_object(&candidate) {
                return candidate;
            }
        }
    }

    // Truncated output. Terminate an open string first, then close the
    // remaining brackets innermost-out.
    if in_string {
        scanned.push('"');
    }
    while let Some(open) = stack.pop() {
        scanned.push(if open == '{' { '}' } else { ']' });
    }

    let candidate = strip_trailing_commas(&scanned);
    if parses_as_object(&candidate) {
        return candidate;
    }

    "{}".to_string()
}

fn parses_as_object(text: &str) -> bool {
    serde_json::from_str::<Map<String, Value>>(text).is_ok()
}

fn strip_trailing_commas(text: &str) -> String {
    TRAILING_COMMA.replace_all(text, "$1").into_owned()
}

/// Normalizes an `args` field emitted as bare tokens, either
/// `"args": [-n 1]` or `"args": "-n 1"`, into a proper JSON string array.
/// Arrays that already contain quoted strings are left alone.
pub fn fix_args_field(text: &str) -> String {
    let pass_one = BARE_ARGS_ARRAY.replace_all(text, |caps: &regex::Captures<'_>| {
        let content = &caps[1];
        if content.contains('"') || content.trim().is_empty() {
            return caps[0].to_string();
        }
        format!("\"args\": [{}]", quote_tokens(content))
    });

    STRING_ARGS
        .replace_all(&pass_one, |caps: &regex::Captures<'_>| {
            format!("\"args\": [{}]", quote_tokens(&caps[1]))
        })
        .into_owned()
}

fn quote_tokens(content: &str) -> String {
    content
        .split_whitespace()
        .map(|token| format!("{:?}", token))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn assert_valid_object(text: &str) {
        assert!(
            serde_json::from_str::<Map<String, Value>>(text).is_ok(),
            "not a valid JSON object: {text}"
        );
    }

    #[test]
    fn clean_input_round_trips() {
        let input = r#"{"tool": "read_file", "input": {"path": "a.txt"}}"#;
        assert_eq!(extract_json(input), input);
    }

    #[test]
    fn pure_prose_yields_empty_object() {
        assert_eq!(extract_json("Sure, I can help with that!"), "{}");
        assert_eq!(extract_json(""), "{}");
    }

    #[test]
    fn recovers_object_wrapped_in_prose() {
        let input = r#"Sure! Here is the call: {"tool": "respond"} Hope that helps."#;
        assert_eq!(extract_json(input), r#"{"tool": "respond"}"#);
    }

    #[test]
    fn recovers_object_inside_markdown_fence() {
        let input = "Sure! ```json\n{\"tool\":\"respond\",\"input\":{\"message\":\"Hello!\"}}\n```";
        assert_eq!(
            extract_json(input),
            r#"{"tool":"respond","input":{"message":"Hello!"}}"#
        );
    }

    #[test]
    fn closes_truncated_object() {
        let out = extract_json(r#"{"tool": "git", "input": {"cmd": "log""#);
        assert_valid_object(&out);
        assert!(out.contains("\"cmd\""));
    }

    #[test]
    fn closes_string_truncated_mid_value() {
        let out = extract_json(r#"{"tool": "resp"#);
        assert_valid_object(&out);
        assert!(out.contains("resp"));
    }

    #[test]
    fn strips_trailing_commas() {
        let out = extract_json(r#"{"tool": "git", "input": {"cmd": "status",},}"#);
        assert_valid_object(&out);
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["input"]["cmd"], "status");
    }

    #[test]
    fn skips_mismatched_closers() {
        let out = extract_json(r#"{"tool": "respond"}]}"#);
        assert_eq!(out, r#"{"tool": "respond"}"#);
    }

    #[test]
    fn returns_first_complete_object_before_garbage() {
        let out = extract_json(r#"{"a": 1} {"b": 2}"#);
        assert_eq!(out, r#"{"a": 1}"#);
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_the_scanner() {
        let input = r#"{"tool": "respond", "input": {"message": "use {braces} and \"quotes\""}}"#;
        assert_eq!(extract_json(input), input);
    }

    #[test]
    fn bare_args_array_is_quoted() {
        let out = fix_args_field(r#"{"cmd": "log", "args": [-n 1]}"#);
        assert_eq!(out, r#"{"cmd": "log", "args": ["-n", "1"]}"#);
        assert_valid_object(&out);
    }

    #[test]
    fn string_args_are_split_into_an_array() {
        let out = fix_args_field(r#"{"cmd": "log", "args": "-n 1"}"#);
        assert_eq!(out, r#"{"cmd": "log", "args": ["-n", "1"]}"#);
    }

    #[test]
    fn quoted_args_arrays_are_left_alone() {
        let input = r#"{"args": ["-n", "1"]}"#;
        assert_eq!(fix_args_field(input), input);
    }

    #[test]
    fn empty_args_arrays_are_left_alone() {
        let input = r#"{"args": []}"#;
        assert_eq!(fix_args_field(input), input);
    }

    #[test]
    fn extract_applies_args_repair_end_to_end() {
        let out = extract_json(r#"{"tool": "git", "input": {"cmd": "log", "args": [-n 1]}}"#);
        assert_valid_object(&out);
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["input"]["args"][0], "-n");
        assert_eq!(parsed["input"]["args"][1], "1");
    }

    #[test]
    fn never_panics_on_adversarial_input() {
        for input in [
            "{{{{",
            "}}}}",
            "{\"a\": [}",
            "{\"a\": \"\\",
            "null",
            "[1,2,3]",
            "{\"a\": [1, {\"b\": ]}}",
        ] {
            assert_valid_object(&extract_json(input));
        }
    }
}
