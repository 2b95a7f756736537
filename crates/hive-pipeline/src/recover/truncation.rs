//! Recovery of JSON objects whose tail was cut off.

use serde_json::Value;

/// How many earlier cut points to try before giving up.
const MAX_CUTBACKS: usize = 64;

/// Scan state at the end of a prefix.
struct Scan {
    /// Unclosed containers, innermost last.
    stack: Vec<char>,
    in_string: bool,
    /// A backslash inside a string is waiting for its escaped character.
    escape_pending: bool,
    /// Byte offsets where the prefix can be cut so it ends on a completed
    /// value or a just-opened container, outside any string.
    cut_points: Vec<usize>,
}

fn scan(text: &str) -> Scan {
    let mut s = Scan {
        stack: Vec::new(),
        in_string: false,
        escape_pending: false,
        cut_points: Vec::new(),
    };
    for (i, c) in text.char_indices() {
        if s.in_string {
            if s.escape_pending {
                s.escape_pending = false;
            } else if c == '\\' {
                s.escape_pending = true;
            } else if c == '"' {
                s.in_string = false;
            }
            continue;
        }
        match c {
            '"' => s.in_string = true,
            '{' | '[' => {
                s.stack.push(c);
                s.cut_points.push(i + 1);
            }
            '}' | ']' => {
                s.stack.pop();
                s.cut_points.push(i + 1);
            }
            ',' => s.cut_points.push(i),
            _ => {}
        }
    }
    s
}

/// Close a truncated JSON text.
///
/// Closes a dangling string, drops trailing commas, completes a dangling
/// `"key":` with `null`, then appends one closer per unclosed container in
/// nesting order.
pub fn close_truncated(text: &str) -> String {
    let state = scan(text);
    let mut out = text.to_string();

    if state.in_string {
        if state.escape_pending {
            out.pop();
        }
        out.push('"');
    }

    loop {
        let trimmed = out.trim_end().len();
        out.truncate(trimmed);
        if out.ends_with(',') {
            out.pop();
        } else {
            break;
        }
    }

    if out.ends_with(':') {
        out.push_str(" null");
    }

    for open in state.stack.iter().rev() {
        out.push(if *open == '{' { '}' } else { ']' });
    }
    out
}

/// Recover an object from a truncated prefix.
///
/// Tries [`close_truncated`] on the whole text first, then on successively
/// earlier cut points. Content past the chosen cut point is lost.
pub fn repair_truncated(text: &str) -> Option<(String, Value)> {
    let closed = close_truncated(text);
    if let Some(value) = parse_object(&closed) {
        return Some((closed, value));
    }

    let state = scan(text);
    state
        .cut_points
        .iter()
        .rev()
        .take(MAX_CUTBACKS)
        .find_map(|&cut| {
            let closed = close_truncated(&text[..cut]);
            parse_object(&closed).map(|value| (closed, value))
        })
}

fn parse_object(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(v @ Value::Object(_)) => Some(v),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn closes_nested_containers_in_order() {
        assert_eq!(close_truncated(r#"{"a": [{"b": 1"#), r#"{"a": [{"b": 1}]}"#);
        assert_eq!(close_truncated(r#"{"a": {"b": [1, 2"#), r#"{"a": {"b": [1, 2]}}"#);
    }

    #[test]
    fn strips_dangling_comma() {
        assert_eq!(close_truncated("{\"a\": [1, 2,\n  "), "{\"a\": [1, 2]}");
    }

    #[test]
    fn closes_dangling_string() {
        assert_eq!(close_truncated(r#"{"a": "hel"#), r#"{"a": "hel"}"#);
    }

    #[test]
    fn drops_half_escape_in_dangling_string() {
        let closed = close_truncated(r#"{"a": "line\"#);
        assert_eq!(closed, r#"{"a": "line"}"#);
    }

    #[test]
    fn completes_dangling_key() {
        assert_eq!(close_truncated(r#"{"a": 1, "b":"#), r#"{"a": 1, "b": null}"#);
    }

    #[test]
    fn ignores_brackets_inside_strings() {
        assert_eq!(close_truncated(r#"{"a": "[{", "b": ["#), r#"{"a": "[{", "b": []}"#);
    }

    #[test]
    fn repair_cuts_back_past_partial_literal() {
        let (text, value) = repair_truncated(r#"{"a": [1, 2], "b": tr"#).unwrap();
        assert_eq!(value, json!({"a": [1, 2]}));
        assert_eq!(text, r#"{"a": [1, 2]}"#);
    }

    #[test]
    fn repair_cuts_back_past_key_without_colon() {
        let (_, value) = repair_truncated(r#"{"a": 1, "bee"#).unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn repair_cuts_back_past_partial_number() {
        let (_, value) = repair_truncated(r#"{"a": {"x": 1}, "b": 12."#).unwrap();
        assert_eq!(value, json!({"a": {"x": 1}}));
    }

    #[test]
    fn repair_keeps_open_container() {
        let (_, value) = repair_truncated(r#"{"a": 1, "b": {"c": "#).unwrap();
        assert_eq!(value, json!({"a": 1, "b": {"c": null}}));
    }

    #[test]
    fn repair_rejects_non_object() {
        assert!(repair_truncated("[1, 2").is_none());
        assert!(repair_truncated("nothing here").is_none());
    }
}
