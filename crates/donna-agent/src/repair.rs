//! Lenient parsing for structured LLM output.
//!
//! Analysis prompts ask for strict JSON, but models under a tight deadline
//! return fenced, truncated, or comma-littered documents. The repair pass
//! fixes the three failure shapes seen in practice — trailing commas,
//! unterminated strings, and unbalanced braces/brackets — before giving up.

use serde_json::Value;

/// Parse `raw` as JSON, repairing it if needed. Returns `None` only when the
/// text is unsalvageable.
pub fn parse_json_lenient(raw: &str) -> Option<Value> {
    let trimmed = strip_fences(raw.trim());

    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return Some(v);
    }

    // models often wrap the document in prose — cut to the outermost value
    let sliced = slice_to_value(trimmed).unwrap_or(trimmed);
    if let Ok(v) = serde_json::from_str::<Value>(sliced) {
        return Some(v);
    }

    let repaired = repair(sliced);
    serde_json::from_str::<Value>(&repaired).ok()
}

/// Remove a ```json … ``` (or plain ```) fence if present.
fn strip_fences(s: &str) -> &str {
    let s = s.trim();
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start();
    rest.strip_suffix("```").map(str::trim_end).unwrap_or(rest)
}

/// Cut to the region from the first `{`/`[` to the last `}`/`]` when one
/// exists; truncated documents keep their open head for the repair pass.
fn slice_to_value(s: &str) -> Option<&str> {
    let start = s.find(['{', '['])?;
    match s.rfind(['}', ']']) {
        Some(end) if end > start => Some(&s[start..=end]),
        _ => Some(&s[start..]),
    }
}

/// Apply the three repairs. Operates outside string literals only, tracking
/// escapes, and closes whatever is still open at the end of input.
fn repair(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for ch in s.chars() {
        if in_string {
            out.push(ch);
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
            '"' => {
                in_string = true;
                out.push(ch);
            }
            '{' => {
                stack.push('}');
                out.push(ch);
            }
            '[' => {
                stack.push(']');
                out.push(ch);
            }
            '}' | ']' => {
                // drop a closer that has no matching opener
                if stack.last() == Some(&ch) {
                    stack.pop();
                    // trailing comma directly before a closer
                    trim_trailing_comma(&mut out);
                    out.push(ch);
                }
            }
            _ => out.push(ch),
        }
    }

    if in_string {
        out.push('"');
    }
    trim_trailing_comma(&mut out);
    while let Some(closer) = stack.pop() {
        trim_trailing_comma(&mut out);
        out.push(closer);
    }
    out
}

fn trim_trailing_comma(out: &mut String) {
    let trimmed_len = out.trim_end().len();
    if out[..trimmed_len].ends_with(',') {
        out.truncate(trimmed_len - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_json_passes_straight_through() {
        let v = parse_json_lenient(r#"{"a": 1, "b": [2, 3]}"#).unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn strips_markdown_fences() {
        let v = parse_json_lenient("```json\n{\"ok\": true}\n```").unwrap();
        assert_eq!(v["ok"], true);
    }

    #[test]
    fn removes_trailing_commas() {
        let v = parse_json_lenient(r#"{"a": 1, "b": [1, 2,],}"#).unwrap();
        assert_eq!(v["b"][1], 2);
    }

    #[test]
    fn closes_unterminated_string() {
        let v = parse_json_lenient(r#"{"phase": "closing"#).unwrap();
        assert_eq!(v["phase"], "closing");
    }

    #[test]
    fn completes_unbalanced_braces() {
        let v = parse_json_lenient(r#"{"analysis": {"engagement": "low", "nested": [1, 2"#).unwrap();
        assert_eq!(v["analysis"]["engagement"], "low");
        assert_eq!(v["analysis"]["nested"][1], 2);
    }

    #[test]
    fn extracts_object_from_surrounding_prose() {
        let v = parse_json_lenient("Here is the analysis:\n{\"x\": 5}\nLet me know!").unwrap();
        assert_eq!(v["x"], 5);
    }

    #[test]
    fn truncated_mid_key_still_yields_object() {
        let v = parse_json_lenient(r#"{"direction": {"stay_or_shift": "stay"}, "remin"#).unwrap();
        assert_eq!(v["direction"]["stay_or_shift"], "stay");
    }

    #[test]
    fn garbage_returns_none() {
        assert!(parse_json_lenient("no json here at all").is_none());
    }

    #[test]
    fn escaped_quotes_do_not_break_string_tracking() {
        let v = parse_json_lenient(r#"{"note": "she said \"hi\"", "n": 1,}"#).unwrap();
        assert_eq!(v["note"], "she said \"hi\"");
    }
}
