//! Plan data model: validated requests, plan units, sizing arithmetic and
//! the fallback units every failure path falls back to.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Phrase carried by every synthetic unit so callers can tell them apart
/// from model-written content.
pub const FALLBACK_MARKER: &str = "could not be recovered";

pub const MIN_GOAL_CHARS: usize = 3;
pub const MAX_GOAL_CHARS: usize = 500;
pub const MAX_TOTAL_EFFORT: u32 = 365;
pub const MAX_DAILY_HOURS: u32 = 24;

const DAYS_PER_MONTH: u64 = 30;
const DAYS_PER_WEEK: u64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffortUnit {
    Hours,
    Days,
    Months,
}

impl EffortUnit {
    /// Hours represented by one unit of effort at the given daily commitment.
    pub fn hours_factor(self, daily_hours: u32) -> u64 {
        let daily = u64::from(daily_hours);
        match self {
            EffortUnit::Hours => 1,
            EffortUnit::Days => daily,
            EffortUnit::Months => DAYS_PER_MONTH * daily,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EffortUnit::Hours => "hours",
            EffortUnit::Days => "days",
            EffortUnit::Months => "months",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Daily,
    Weekly,
}

impl Granularity {
    /// Word used in unit labels ("Day 3", "Week 3").
    pub fn period_name(self) -> &'static str {
        match self {
            Granularity::Daily => "Day",
            Granularity::Weekly => "Week",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Daily => "daily",
            Granularity::Weekly => "weekly",
        }
    }
}

/// Raw form submission as it arrives over HTTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownForm {
    pub goal: String,
    pub total_effort: u32,
    pub effort_unit: EffortUnit,
    pub daily_hours_commitment: u32,
    pub granularity: Granularity,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("Goal description must be at least {MIN_GOAL_CHARS} characters long.")]
    GoalTooShort,

    #[error("Goal description must be at most {MAX_GOAL_CHARS} characters long.")]
    GoalTooLong,

    #[error("Target duration must be a positive number.")]
    EffortNotPositive,

    #[error("Target duration must be at most {MAX_TOTAL_EFFORT}.")]
    EffortTooLarge,

    #[error("Daily commitment must be between 1 and {MAX_DAILY_HOURS} hours.")]
    DailyHoursOutOfRange,
}

impl BreakdownForm {
    /// Check the submission and turn it into an immutable request.
    pub fn validate(self) -> Result<BreakdownRequest, FormError> {
        let goal = self.goal.trim().to_string();
        let goal_chars = goal.chars().count();
        if goal_chars < MIN_GOAL_CHARS {
            return Err(FormError::GoalTooShort);
        }
        if goal_chars > MAX_GOAL_CHARS {
            return Err(FormError::GoalTooLong);
        }
        if self.total_effort == 0 {
            return Err(FormError::EffortNotPositive);
        }
        if self.total_effort > MAX_TOTAL_EFFORT {
            return Err(FormError::EffortTooLarge);
        }
        if !(1..=MAX_DAILY_HOURS).contains(&self.daily_hours_commitment) {
            return Err(FormError::DailyHoursOutOfRange);
        }

        Ok(BreakdownRequest {
            goal,
            total_effort: self.total_effort,
            effort_unit: self.effort_unit,
            daily_hours_commitment: self.daily_hours_commitment,
            granularity: self.granularity,
        })
    }
}

/// A validated plan request. Fields are read-only once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownRequest {
    goal: String,
    total_effort: u32,
    effort_unit: EffortUnit,
    daily_hours_commitment: u32,
    granularity: Granularity,
}

impl BreakdownRequest {
    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn total_effort(&self) -> u32 {
        self.total_effort
    }

    pub fn effort_unit(&self) -> EffortUnit {
        self.effort_unit
    }

    pub fn daily_hours_commitment(&self) -> u32 {
        self.daily_hours_commitment
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn sizing(&self) -> PlanSizing {
        let daily = u64::from(self.daily_hours_commitment);
        let total_hours =
            u64::from(self.total_effort) * self.effort_unit.hours_factor(self.daily_hours_commitment);
        let total_days = total_hours.div_ceil(daily);
        let total_weeks = total_days.div_ceil(DAYS_PER_WEEK);
        let unit_count = match self.granularity {
            Granularity::Daily => total_days,
            Granularity::Weekly => total_weeks,
        };

        PlanSizing {
            total_hours,
            total_days,
            total_weeks,
            unit_count: unit_count as usize,
            granularity: self.granularity,
        }
    }

    /// Label for the unit at 1-based `index`.
    pub fn unit_label(&self, index: usize) -> String {
        match self.granularity {
            Granularity::Weekly => format!("Week {index}"),
            Granularity::Daily => {
                let hours = self.daily_hours_commitment;
                format!("Day {index} ({hours} {} focus)", hours_noun(u64::from(hours)))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSizing {
    pub total_hours: u64,
    pub total_days: u64,
    pub total_weeks: u64,
    pub unit_count: usize,
    pub granularity: Granularity,
}

/// One labeled period of the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanUnit {
    #[serde(rename = "unit")]
    pub label: String,
    #[serde(rename = "tasks")]
    pub subtasks: Vec<String>,
}

impl PlanUnit {
    pub fn new(label: impl Into<String>, subtasks: Vec<String>) -> Self {
        Self {
            label: label.into(),
            subtasks,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.subtasks.iter().any(|t| t.contains(FALLBACK_MARKER))
    }
}

/// Placeholder for a period whose content could not be generated or parsed.
/// "hour" or "hours" for a count.
pub fn hours_noun(count: u64) -> &'static str {
    if count == 1 {
        "hour"
    } else {
        "hours"
    }
}

pub fn make_fallback_unit(granularity: Granularity, index: usize) -> PlanUnit {
    let period = granularity.period_name();
    PlanUnit {
        label: format!("{period} {index} (fallback)"),
        subtasks: vec![format!(
            "Details for {} {index} {FALLBACK_MARKER}; review the surrounding periods and plan this one manually.",
            period.to_lowercase()
        )],
    }
}

/// Fallback units for the inclusive range `start..=end`.
pub fn fallback_range(granularity: Granularity, start: usize, end: usize) -> Vec<PlanUnit> {
    (start..=end)
        .map(|index| make_fallback_unit(granularity, index))
        .collect()
}

/// The full plan, in chronological order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakdown {
    #[serde(rename = "breakdown")]
    pub units: Vec<PlanUnit>,
}

impl Breakdown {
    pub fn new(units: Vec<PlanUnit>) -> Self {
        Self { units }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn fallback_count(&self) -> usize {
        self.units.iter().filter(|u| u.is_fallback()).count()
    }

    pub fn task_count(&self) -> usize {
        self.units.iter().map(|u| u.subtasks.len()).sum()
    }
}

/// Units produced for one batch of a chunked generation.
#[derive(Debug, Clone)]
pub struct ChunkResult {
    pub range_start: usize,
    pub range_end: usize,
    pub units: Vec<PlanUnit>,
}

impl ChunkResult {
    pub fn expected_len(&self) -> usize {
        self.range_end + 1 - self.range_start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(total: u32, unit: EffortUnit, daily: u32, granularity: Granularity) -> BreakdownForm {
        BreakdownForm {
            goal: "Learn basic cooking".to_string(),
            total_effort: total,
            effort_unit: unit,
            daily_hours_commitment: daily,
            granularity,
        }
    }

    #[test]
    fn test_cooking_example_sizing_and_labels() {
        let request = form(10, EffortUnit::Hours, 2, Granularity::Daily)
            .validate()
            .unwrap();
        let sizing = request.sizing();

        assert_eq!(sizing.total_hours, 10);
        assert_eq!(sizing.unit_count, 5);
        assert_eq!(request.unit_label(1), "Day 1 (2 hours focus)");
        assert_eq!(request.unit_label(5), "Day 5 (2 hours focus)");
    }

    #[test]
    fn test_weekly_sizing_uses_hours_conversion() {
        let days = form(140, EffortUnit::Days, 2, Granularity::Weekly)
            .validate()
            .unwrap();
        assert_eq!(days.sizing().total_days, 140);
        assert_eq!(days.sizing().unit_count, 20);

        let months = form(13, EffortUnit::Months, 1, Granularity::Weekly)
            .validate()
            .unwrap();
        assert_eq!(months.sizing().total_days, 390);
        assert_eq!(months.sizing().total_weeks, 56);
    }

    #[test]
    fn test_single_hour_label() {
        let request = form(3, EffortUnit::Hours, 1, Granularity::Daily)
            .validate()
            .unwrap();
        assert_eq!(request.unit_label(2), "Day 2 (1 hour focus)");
    }

    #[test]
    fn test_form_rejections() {
        let mut short = form(10, EffortUnit::Hours, 2, Granularity::Daily);
        short.goal = "  ab ".to_string();
        assert_eq!(short.validate().unwrap_err(), FormError::GoalTooShort);

        let mut long = form(10, EffortUnit::Hours, 2, Granularity::Daily);
        long.goal = "x".repeat(501);
        assert_eq!(long.validate().unwrap_err(), FormError::GoalTooLong);

        assert_eq!(
            form(0, EffortUnit::Days, 2, Granularity::Daily)
                .validate()
                .unwrap_err(),
            FormError::EffortNotPositive
        );
        assert_eq!(
            form(366, EffortUnit::Days, 2, Granularity::Daily)
                .validate()
                .unwrap_err(),
            FormError::EffortTooLarge
        );
        assert_eq!(
            form(5, EffortUnit::Days, 25, Granularity::Daily)
                .validate()
                .unwrap_err(),
            FormError::DailyHoursOutOfRange
        );
    }

    #[test]
    fn test_fallback_units_are_marked() {
        let unit = make_fallback_unit(Granularity::Weekly, 9);
        assert_eq!(unit.label, "Week 9 (fallback)");
        assert_eq!(unit.subtasks.len(), 1);
        assert!(unit.is_fallback());
        assert!(!PlanUnit::new("Week 1", vec!["Read".to_string()]).is_fallback());

        let range = fallback_range(Granularity::Daily, 3, 5);
        assert_eq!(range.len(), 3);
        assert_eq!(range[0].label, "Day 3 (fallback)");
    }

    #[test]
    fn test_plan_unit_wire_format() {
        let breakdown = Breakdown::new(vec![PlanUnit::new("Week 1", vec!["a".to_string()])]);
        let json = serde_json::to_value(&breakdown).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"breakdown": [{"unit": "Week 1", "tasks": ["a"]}]})
        );
    }
}
