//! Recovery of a typed [`Breakdown`] from raw model output.
//!
//! Stages run in a fixed order and the first one that yields a schema-valid
//! breakdown wins:
//! - `direct`: strict parse of the untouched text
//! - `normalized`: quote/whitespace cleanup and prose trimming
//! - `structural`: closing of truncated arrays and objects
//! - `extracted`: pattern-based salvage, which only fails when the text never
//!   mentions a plan period at all

pub mod extract;
pub mod normalize;
pub mod structural;

use serde_json::Value;
use thiserror::Error;

use crate::plan::Breakdown;
use crate::types::{breakdown_typedef, validate};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepairError {
    #[error("response is not valid JSON: {0}")]
    Syntax(String),

    #[error("response does not match the breakdown schema: {0}")]
    Schema(String),

    #[error("no truncated structure to repair")]
    NotRepairable,

    #[error("no plan units could be recovered from the model response")]
    Unrecoverable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairStage {
    Direct,
    Normalized,
    Structural,
    Extracted,
}

impl RepairStage {
    pub fn as_str(self) -> &'static str {
        match self {
            RepairStage::Direct => "direct",
            RepairStage::Normalized => "normalized",
            RepairStage::Structural => "structural",
            RepairStage::Extracted => "extracted",
        }
    }
}

pub type Stage = fn(&str) -> Result<Breakdown, RepairError>;

pub const STAGES: [(RepairStage, Stage); 4] = [
    (RepairStage::Direct, parse_breakdown),
    (RepairStage::Normalized, normalize::parse_normalized),
    (RepairStage::Structural, structural::repair),
    (RepairStage::Extracted, extract::extract),
];

#[derive(Debug, Clone)]
pub struct Repaired {
    pub breakdown: Breakdown,
    pub stage: RepairStage,
}

/// Run every stage in order until one produces a breakdown.
pub fn recover_breakdown(raw: &str) -> Result<Repaired, RepairError> {
    let mut last_error = RepairError::Unrecoverable;

    for (stage, run) in STAGES {
        match run(raw) {
            Ok(breakdown) => {
                if stage != RepairStage::Direct {
                    tracing::info!(
                        "Recovered {} units from model response via {} stage",
                        breakdown.len(),
                        stage.as_str()
                    );
                }
                return Ok(Repaired { breakdown, stage });
            }
            Err(e) => {
                tracing::debug!("Repair stage {} failed: {}", stage.as_str(), e);
                last_error = e;
            }
        }
    }

    Err(last_error)
}

/// Strict parse: valid JSON that also matches the breakdown schema.
pub fn parse_breakdown(text: &str) -> Result<Breakdown, RepairError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| RepairError::Syntax(e.to_string()))?;

    validate(&breakdown_typedef(), &value).map_err(|errors| {
        RepairError::Schema(
            errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        )
    })?;

    serde_json::from_value(value).map_err(|e| RepairError::Schema(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
  "breakdown": [
    {"unit": "Week 1", "tasks": ["Set up  tools", "Read the intro"]},
    {"unit": "Week 2", "tasks": ["Build a small project"]}
  ]
}"#;

    #[test]
    fn test_valid_input_is_parsed_directly() {
        let repaired = recover_breakdown(VALID).unwrap();
        let direct: Breakdown = serde_json::from_str(VALID).unwrap();

        assert_eq!(repaired.stage, RepairStage::Direct);
        // Double space inside a task survives because no cleanup ran.
        assert_eq!(repaired.breakdown, direct);
        assert_eq!(repaired.breakdown.units[0].subtasks[0], "Set up  tools");
    }

    #[test]
    fn test_prose_wrapped_object_is_normalized() {
        let raw = format!("Sure! Here is your plan:\n```json\n{VALID}\n```\nGood luck!");
        let repaired = recover_breakdown(&raw).unwrap();

        assert_eq!(repaired.stage, RepairStage::Normalized);
        assert_eq!(repaired.breakdown.len(), 2);
    }

    #[test]
    fn test_truncated_response_loses_only_the_partial_unit() {
        let raw = r#"{"breakdown": [
            {"unit": "Week 1", "tasks": ["a", "b"]},
            {"unit": "Week 2", "tasks": ["c"]},
            {"unit": "Week 3", "tasks": ["d", "half-writ"#;
        let repaired = recover_breakdown(raw).unwrap();

        assert_eq!(repaired.stage, RepairStage::Structural);
        assert_eq!(repaired.breakdown.len(), 2);
        assert_eq!(repaired.breakdown.units[1].label, "Week 2");
    }

    #[test]
    fn test_every_recoverable_input_is_non_empty() {
        let inputs = [
            VALID,
            "garbage but mentions Week 3 somewhere",
            r#"{"unit": "Week 1", "tasks": ["x"]} trailing"#,
            r#"{"breakdown": [{"unit": "Day 1", "tasks": ["y""#,
        ];
        for input in inputs {
            let repaired = recover_breakdown(input).unwrap();
            assert!(!repaired.breakdown.is_empty(), "empty result for {input}");
        }
    }

    #[test]
    fn test_text_without_periods_is_unrecoverable() {
        let err = recover_breakdown("I cannot help with that.").unwrap_err();
        assert_eq!(err, RepairError::Unrecoverable);
    }

    #[test]
    fn test_schema_mismatch_is_reported() {
        let err = parse_breakdown(r#"{"plan": []}"#).unwrap_err();
        assert!(matches!(err, RepairError::Schema(_)));
    }
}
