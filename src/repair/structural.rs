//! Bracket closing for responses that were cut off mid-document.
//!
//! Only the truncation shapes seen from chat models are handled: a response
//! that stops inside a task list or between two unit objects.

use crate::plan::Breakdown;

use super::normalize::{collapse_whitespace, straighten_quotes, strip_trailing_commas};
use super::{parse_breakdown, RepairError};

/// Closes the current task list, the current unit object and the outer array.
const CLOSE_AFTER_TASKS: &str = "}]}";
/// Closes the outer breakdown array and the response object.
const CLOSE_AFTER_UNIT: &str = "]}";

pub fn repair(raw: &str) -> Result<Breakdown, RepairError> {
    let text = prepare(raw).ok_or(RepairError::NotRepairable)?;

    let mut last_error = RepairError::NotRepairable;
    for candidate in candidates(&text) {
        match parse_breakdown(&candidate) {
            Ok(breakdown) => return Ok(breakdown),
            Err(e) => last_error = e,
        }
    }
    Err(last_error)
}

/// Cleaned text starting at the first `{`, or `None` when there is none.
fn prepare(raw: &str) -> Option<String> {
    let cleaned = strip_trailing_commas(&collapse_whitespace(&straighten_quotes(raw)));
    let start = cleaned.find('{')?;
    Some(cleaned[start..].trim_end().to_string())
}

fn candidates(text: &str) -> Vec<String> {
    let mut out = Vec::new();

    if let Some(truncated) = close_truncated(text) {
        let rebalanced = balance_brackets(&truncated);
        out.push(truncated);
        out.extend(rebalanced);
    }
    out.extend(balance_brackets(text));

    out
}

/// Cut the text after whichever came last, the final closed task list
/// (`"]`) or the final closed object (`}`), and append matching closers.
pub fn close_truncated(text: &str) -> Option<String> {
    if text.ends_with('}') {
        return None;
    }

    let array_end = text.rfind("\"]").map(|i| i + 2);
    let object_end = text.rfind('}').map(|i| i + 1);

    let (cut, suffix) = match (array_end, object_end) {
        (Some(a), Some(o)) if a > o => (a, CLOSE_AFTER_TASKS),
        (Some(a), None) => (a, CLOSE_AFTER_TASKS),
        (_, Some(o)) => (o, CLOSE_AFTER_UNIT),
        (None, None) => return None,
    };

    let mut repaired = String::with_capacity(cut + suffix.len());
    repaired.push_str(&text[..cut]);
    repaired.push_str(suffix);
    Some(repaired)
}

/// Append whatever closers a string-aware scan finds missing.
///
/// Returns `None` when nothing is open or when the text closes something it
/// never opened.
pub fn balance_brackets(text: &str) -> Option<String> {
    let mut open: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => open.push('}'),
            '[' => open.push(']'),
            '}' | ']' => {
                if open.pop() != Some(c) {
                    return None;
                }
            }
            _ => {}
        }
    }

    if open.is_empty() && !in_string {
        return None;
    }

    let mut repaired = text.to_string();
    if in_string {
        repaired.push('"');
    }
    let trimmed_len = repaired.trim_end_matches([',', ' ', ':']).len();
    repaired.truncate(trimmed_len);
    repaired.extend(open.iter().rev());
    Some(repaired)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cut_inside_last_task_list() {
        let text = r#"{"breakdown": [{"unit": "Week 1", "tasks": ["a", "b"]}, {"unit": "Week 2", "tasks": ["c", "d"#;
        assert_eq!(
            close_truncated(text).unwrap(),
            r#"{"breakdown": [{"unit": "Week 1", "tasks": ["a", "b"]}]}"#
        );
        assert_eq!(repair(text).unwrap().len(), 1);
    }

    #[test]
    fn test_cut_after_closed_task_list() {
        let text = r#"{"breakdown": [{"unit": "Week 1", "tasks": ["a"]}, {"unit": "Week 2", "tasks": ["b", "c"], "notes": "mo"#;
        let repaired = close_truncated(text).unwrap();
        assert!(repaired.ends_with(r#"["b", "c"]}]}"#));

        let breakdown = repair(text).unwrap();
        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown.units[1].subtasks, vec!["b", "c"]);
    }

    #[test]
    fn test_complete_text_is_left_to_the_balancer() {
        assert_eq!(close_truncated(r#"{"breakdown": []}"#), None);
    }

    #[test]
    fn test_balancer_closes_open_string_and_brackets() {
        let text = r#"{"breakdown": [{"unit": "Day 1", "tasks": ["y", "unfinish"#;
        assert_eq!(
            balance_brackets(text).unwrap(),
            r#"{"breakdown": [{"unit": "Day 1", "tasks": ["y", "unfinish"]}]}"#
        );
    }

    #[test]
    fn test_balancer_ignores_brackets_inside_strings() {
        let text = r#"{"breakdown": [{"unit": "Week 1", "tasks": ["use [brackets] and {braces}"]}"#;
        let breakdown = repair(text).unwrap();
        assert_eq!(breakdown.units[0].subtasks[0], "use [brackets] and {braces}");
    }

    #[test]
    fn test_balancer_rejects_stray_closers() {
        assert_eq!(balance_brackets(r#"{"a": 1}]}"#), None);
        assert_eq!(balance_brackets(r#"{"a": 1}"#), None);
    }

    #[test]
    fn test_text_without_object_is_not_repairable() {
        assert_eq!(repair("just words").unwrap_err(), RepairError::NotRepairable);
    }
}
