//! Separator repair for almost-JSON text.
//!
//! A single left-to-right scan that is aware of string literals and fixes
//! exactly three classes of defect outside them:
//! - trailing commas before `}` or `]` are dropped
//! - runs of commas collapse to one
//! - a missing comma between a completed value and the start of the next
//!   value is inserted
//!
//! The pass is idempotent: its output contains none of the defects it fixes.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Last {
    /// Start of input, or just after `{`, `[` or `:`.
    Open,
    /// After a completed value: closing quote, `}`, `]`, number or literal.
    Value,
    Comma,
}

fn starts_value(c: char) -> bool {
    matches!(c, '{' | '[' | '"' | '-' | 't' | 'f' | 'n') || c.is_ascii_digit()
}

fn is_bare(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '-' | '_')
}

pub fn repair_syntax(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    let mut last = Last::Open;
    // Byte index in `out` of the comma that may need removing.
    let mut pending_comma: Option<usize> = None;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                if last == Last::Value {
                    out.push(',');
                }
                out.push('"');
                let mut escaped = false;
                for s in chars.by_ref() {
                    out.push(s);
                    if escaped {
                        escaped = false;
                    } else if s == '\\' {
                        escaped = true;
                    } else if s == '"' {
                        break;
                    }
                }
                last = Last::Value;
                pending_comma = None;
            }
            ',' => {
                if last == Last::Comma {
                    continue;
                }
                pending_comma = Some(out.len());
                out.push(',');
                last = Last::Comma;
            }
            '}' | ']' => {
                if let (Last::Comma, Some(idx)) = (last, pending_comma) {
                    out.remove(idx);
                }
                out.push(c);
                last = Last::Value;
                pending_comma = None;
            }
            '{' | '[' => {
                if last == Last::Value {
                    out.push(',');
                }
                out.push(c);
                last = Last::Open;
                pending_comma = None;
            }
            ':' => {
                out.push(c);
                last = Last::Open;
                pending_comma = None;
            }
            c if c.is_whitespace() => out.push(c),
            c if is_bare(c) => {
                if last == Last::Value && starts_value(c) {
                    out.push(',');
                }
                out.push(c);
                while let Some(&n) = chars.peek() {
                    if !is_bare(n) {
                        break;
                    }
                    out.push(n);
                    chars.next();
                }
                last = Last::Value;
                pending_comma = None;
            }
            other => {
                out.push(other);
                pending_comma = None;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn parse(s: &str) -> Value {
        serde_json::from_str(s).unwrap_or_else(|e| panic!("{e}: {s}"))
    }

    #[test]
    fn strips_trailing_commas() {
        assert_eq!(repair_syntax(r#"{"a": 1,}"#), r#"{"a": 1}"#);
        assert_eq!(repair_syntax("[1, 2, ]"), "[1, 2 ]");
        assert_eq!(parse(&repair_syntax("{\"a\": [1,\n],\n}")), json!({"a": [1]}));
    }

    #[test]
    fn collapses_duplicate_commas() {
        assert_eq!(repair_syntax("[1,,2]"), "[1,2]");
        assert_eq!(repair_syntax("[1, , 2]"), "[1,  2]");
        assert_eq!(parse(&repair_syntax("[1,,]")), json!([1]));
    }

    #[test]
    fn inserts_comma_between_adjacent_composites() {
        let fixed = repair_syntax(r#"[{"a": 1}{"b": 2}]"#);
        assert_eq!(parse(&fixed), json!([{"a": 1}, {"b": 2}]));
        let fixed = repair_syntax("[[1] [2]]");
        assert_eq!(parse(&fixed), json!([[1], [2]]));
    }

    #[test]
    fn inserts_comma_between_scalar_and_composite() {
        assert_eq!(parse(&repair_syntax(r#"["x" {"a": 1}]"#)), json!(["x", {"a": 1}]));
        assert_eq!(parse(&repair_syntax("[1 [2]]")), json!([1, [2]]));
        assert_eq!(parse(&repair_syntax("[true {}]")), json!([true, {}]));
        assert_eq!(parse(&repair_syntax("[null\n[]]")), json!([null, []]));
    }

    #[test]
    fn inserts_comma_between_object_members() {
        let fixed = repair_syntax("{\n  \"a\": 1\n  \"b\": \"two\"\n  \"c\": [3]\n}");
        assert_eq!(parse(&fixed), json!({"a": 1, "b": "two", "c": [3]}));
    }

    #[test]
    fn leaves_string_contents_alone() {
        let text = r#"{"a": "x,, y }{ ,]", "b": "say \"hi\", ok"}"#;
        assert_eq!(repair_syntax(text), text);
    }

    #[test]
    fn does_not_touch_valid_json() {
        let text = r#"{"a": [1, -2.5e3, true, null], "b": {"c": "d"}}"#;
        assert_eq!(repair_syntax(text), text);
    }

    #[test]
    fn is_idempotent() {
        let samples = [
            r#"{"a": 1,, "b": [1 2 3,] "c": {"d": true}{"e": null},}"#,
            "[,1,,,2,]",
            r#"{"k": "v" "k2": -1}"#,
        ];
        for s in samples {
            let once = repair_syntax(s);
            assert_eq!(repair_syntax(&once), once, "not idempotent on {s}");
        }
    }
}
