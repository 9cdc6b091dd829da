//! Text cleanup that makes model output more likely to parse.

use crate::plan::Breakdown;

use super::{parse_breakdown, RepairError};

/// Replace typographic quotes and apostrophes with their ASCII forms.
pub fn straighten_quotes(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' | '\u{00AB}'
            | '\u{00BB}' => '"',
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' => '\'',
            other => other,
        })
        .collect()
}

/// Collapse every whitespace run, newlines included, to one space.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drop commas that directly precede a `]` or `}`. Commas inside strings are
/// kept.
pub fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
        } else if c == '"' {
            in_string = true;
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
            if matches!(next, Some(']') | Some('}')) {
                continue;
            }
        }
        out.push(c);
    }

    out
}

/// Clean up quotes, whitespace and trailing commas, then keep only the span
/// from the first `{` to the last `}`. Text without such a span is returned
/// cleaned but otherwise unchanged.
pub fn normalize(raw: &str) -> String {
    let cleaned = strip_trailing_commas(&collapse_whitespace(&straighten_quotes(raw)));

    match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if start < end => cleaned[start..=end].to_string(),
        _ => cleaned,
    }
}

pub fn parse_normalized(raw: &str) -> Result<Breakdown, RepairError> {
    parse_breakdown(&normalize(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_straightens_smart_quotes() {
        assert_eq!(
            straighten_quotes("\u{201C}unit\u{201D}: \u{2018}x\u{2019}"),
            "\"unit\": 'x'"
        );
    }

    #[test]
    fn test_strips_fences_and_prose() {
        let raw = "Here you go:\n```json\n{\n  \"breakdown\": []\n}\n```\nEnjoy";
        assert_eq!(normalize(raw), "{ \"breakdown\": [] }");
    }

    #[test]
    fn test_text_without_braces_is_only_cleaned() {
        assert_eq!(normalize("  no\n\njson   here "), "no json here");
    }

    #[test]
    fn test_parses_smart_quoted_json() {
        let raw = "{\u{201C}breakdown\u{201D}: [{\u{201C}unit\u{201D}: \u{201C}Week 1\u{201D}, \u{201C}tasks\u{201D}: [\u{201C}Plan\u{201D}]}]}";
        let breakdown = parse_normalized(raw).unwrap();
        assert_eq!(breakdown.units[0].label, "Week 1");
    }

    #[test]
    fn test_trailing_commas_are_dropped_outside_strings() {
        assert_eq!(
            strip_trailing_commas(r#"{"tasks": ["a, ]", "b",], }"#),
            r#"{"tasks": ["a, ]", "b"] }"#
        );
        assert_eq!(strip_trailing_commas(r#"["a\", ]"]"#), r#"["a\", ]"]"#);
    }

    #[test]
    fn test_parses_example_shape_with_trailing_commas() {
        let raw = r#"{
  "breakdown": [
    {"unit": "Day 1 (2 hours focus)", "tasks": ["Set up tools", "Read intro",],},
    {"unit": "Day 2 (2 hours focus)", "tasks": ["Practice basics",],},
  ],
}"#;
        let breakdown = parse_normalized(raw).unwrap();
        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown.units[0].subtasks, vec!["Set up tools", "Read intro"]);
        assert!(!breakdown.units[1].is_fallback());
    }

    #[test]
    fn test_newlines_inside_strings_are_flattened() {
        let raw = "{\"breakdown\": [{\"unit\": \"Week 1\", \"tasks\": [\"Read\nthe docs\"]}]}";
        let breakdown = parse_normalized(raw).unwrap();
        assert_eq!(breakdown.units[0].subtasks[0], "Read the docs");
    }
}
