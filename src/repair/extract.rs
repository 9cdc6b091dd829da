//! Last-resort salvage of plan units from text that will not parse as a
//! whole. Lossy on purpose: partial content with placeholders beats an error
//! page.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::plan::{fallback_range, make_fallback_unit, Breakdown, Granularity, PlanUnit};
use crate::types::{plan_unit_typedef, validate};

use super::normalize::{collapse_whitespace, straighten_quotes, strip_trailing_commas};
use super::RepairError;

/// Upper bound on units synthesized from bare "Week N" mentions.
pub const MAX_SYNTHESIZED_UNITS: usize = 12;

fn unit_fragment_regex() -> &'static Regex {
    static UNIT_FRAGMENT_RE: OnceLock<Regex> = OnceLock::new();
    UNIT_FRAGMENT_RE.get_or_init(|| {
        Regex::new(r#"\{\s*"unit"\s*:\s*"[^"]*"[^{}]*?"tasks"\s*:\s*\[[^\]]*\][^{}]*?\}"#)
            .expect("unit fragment regex must compile")
    })
}

fn unit_field_regex() -> &'static Regex {
    static UNIT_FIELD_RE: OnceLock<Regex> = OnceLock::new();
    UNIT_FIELD_RE.get_or_init(|| {
        Regex::new(r#""unit"\s*:\s*"([^"]*)""#).expect("unit field regex must compile")
    })
}

fn tasks_field_regex() -> &'static Regex {
    static TASKS_FIELD_RE: OnceLock<Regex> = OnceLock::new();
    TASKS_FIELD_RE.get_or_init(|| {
        Regex::new(r#""tasks"\s*:\s*(\[[^\]]*\])"#).expect("tasks field regex must compile")
    })
}

fn quoted_regex() -> &'static Regex {
    static QUOTED_RE: OnceLock<Regex> = OnceLock::new();
    QUOTED_RE.get_or_init(|| {
        Regex::new(r#""((?:[^"\\]|\\.)*)""#).expect("quoted string regex must compile")
    })
}

fn period_regex() -> &'static Regex {
    static PERIOD_RE: OnceLock<Regex> = OnceLock::new();
    PERIOD_RE.get_or_init(|| {
        Regex::new(r"(?i)\b(week|day)\s+(\d+)").expect("period regex must compile")
    })
}

pub fn extract(raw: &str) -> Result<Breakdown, RepairError> {
    let text = collapse_whitespace(&straighten_quotes(raw));
    let granularity = detect_granularity(&text);

    let units = extract_fragments(&text, granularity)
        .or_else(|| pair_fields(&text, granularity))
        .or_else(|| synthesize_from_mentions(&text, granularity))
        .ok_or(RepairError::Unrecoverable)?;

    Ok(Breakdown::new(units))
}

/// Whichever period word the text uses more often; weeks on a tie.
pub fn detect_granularity(text: &str) -> Granularity {
    let (days, weeks) = period_regex()
        .captures_iter(text)
        .fold((0usize, 0usize), |(d, w), caps| {
            if caps[1].eq_ignore_ascii_case("day") {
                (d + 1, w)
            } else {
                (d, w + 1)
            }
        });

    if days > weeks {
        Granularity::Daily
    } else {
        Granularity::Weekly
    }
}

/// First period number in a label such as "Week 4: Foundations".
pub fn label_number(label: &str) -> Option<usize> {
    period_regex()
        .captures(label)
        .and_then(|caps| caps[2].parse().ok())
        .filter(|n| *n > 0)
}

/// Whole `{"unit": ..., "tasks": [...]}` objects, each parsed on its own.
fn extract_fragments(text: &str, granularity: Granularity) -> Option<Vec<PlanUnit>> {
    let units: Vec<PlanUnit> = unit_fragment_regex()
        .find_iter(text)
        .enumerate()
        .map(|(position, fragment)| {
            parse_unit(&strip_trailing_commas(fragment.as_str())).unwrap_or_else(|| {
                let index = label_number(fragment.as_str()).unwrap_or(position + 1);
                tracing::warn!("Unit fragment {} failed to parse, using fallback", index);
                make_fallback_unit(granularity, index)
            })
        })
        .collect();

    (!units.is_empty()).then_some(units)
}

fn parse_unit(fragment: &str) -> Option<PlanUnit> {
    let value: Value = serde_json::from_str(fragment).ok()?;
    validate(&plan_unit_typedef(), &value).ok()?;
    serde_json::from_value(value).ok()
}

/// Separately matched `"unit"` labels and `"tasks"` lists, zipped by position.
fn pair_fields(text: &str, granularity: Granularity) -> Option<Vec<PlanUnit>> {
    let labels: Vec<String> = unit_field_regex()
        .captures_iter(text)
        .map(|caps| caps[1].trim().to_string())
        .collect();
    let task_lists: Vec<Vec<String>> = tasks_field_regex()
        .captures_iter(text)
        .map(|caps| parse_task_list(&caps[1]))
        .collect();

    let units: Vec<PlanUnit> = labels
        .into_iter()
        .zip(task_lists)
        .enumerate()
        .map(|(position, (label, tasks))| {
            if label.is_empty() || tasks.is_empty() {
                let index = label_number(&label).unwrap_or(position + 1);
                make_fallback_unit(granularity, index)
            } else {
                PlanUnit::new(label, tasks)
            }
        })
        .collect();

    (!units.is_empty()).then_some(units)
}

fn parse_task_list(list: &str) -> Vec<String> {
    let tasks = serde_json::from_str::<Vec<String>>(list).unwrap_or_else(|_| {
        quoted_regex()
            .captures_iter(list)
            .map(|caps| caps[1].replace("\\\"", "\""))
            .collect()
    });

    tasks
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Placeholders for every period up to the highest one mentioned.
fn synthesize_from_mentions(text: &str, granularity: Granularity) -> Option<Vec<PlanUnit>> {
    let highest = period_regex()
        .captures_iter(text)
        .filter_map(|caps| caps[2].parse::<usize>().ok())
        .max()
        .filter(|n| *n > 0)?;

    let count = highest.min(MAX_SYNTHESIZED_UNITS);
    tracing::warn!(
        "No unit structure found in model response, synthesizing {} placeholder units",
        count
    );
    Some(fallback_range(granularity, 1, count))
}
