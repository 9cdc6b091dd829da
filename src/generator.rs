//! Plan generation: sizing, single-shot or chunked model calls, repair and
//! outcome classification.
//!
//! Small plans are generated in one call whose errors reach the caller.
//! Plans above the chunk threshold are generated in sequential batches; a
//! batch that fails in any way is replaced by fallback units so the plan
//! always has the expected length.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::activity_log::{ActivityLog, EntryKind};
use crate::export::render_text;
use crate::llm::{CompletionRequest, LlmError, ModelClient};
use crate::plan::{
    fallback_range, make_fallback_unit, Breakdown, BreakdownForm, BreakdownRequest, ChunkResult,
    FormError, Granularity, PlanSizing, PlanUnit,
};
use crate::prompt::{breakdown_system_prompt, breakdown_user_prompt, summary_prompts};
use crate::repair::{recover_breakdown, RepairError};

const SINGLE_SHOT_MAX_TOKENS: u32 = 4000;
const BATCH_MAX_TOKENS: u32 = 3000;
const SUMMARY_MAX_TOKENS: u32 = 120;

pub const SUMMARY_PROGRESS: &str = "Summary generated successfully";

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Plans with more units than this are generated in batches.
    pub chunk_threshold: usize,
    pub batch_size: usize,
    /// Pause between consecutive batch calls.
    pub batch_delay: Duration,
    /// Requests spanning more weeks are rejected before any model call.
    pub max_weeks: u64,
    /// A short single-shot plan is accepted once it has this many units
    /// (or the expected count, whichever is smaller).
    pub min_partial_units: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            chunk_threshold: 12,
            batch_size: 8,
            batch_delay: Duration::from_secs(1),
            max_weeks: 52,
            min_partial_units: 4,
        }
    }
}

#[derive(Debug, Error)]
pub enum BreakdownError {
    #[error(transparent)]
    InvalidInput(#[from] FormError),

    #[error("Requested plan spans {weeks} weeks; at most {max} weeks can be planned at once.")]
    TooLarge { weeks: u64, max: u64 },

    #[error("Model request failed: {0}")]
    Upstream(#[from] LlmError),

    #[error("Could not build a plan from the model response: {0}")]
    Unrecoverable(#[from] RepairError),

    #[error("Model returned an empty summary")]
    EmptySummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Success,
    PartialSuccess,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    SingleShot,
    Chunked,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOutcome {
    pub breakdown: Breakdown,
    pub status: GenerationStatus,
    pub expected_units: usize,
    pub fallback_units: usize,
    pub mode: GenerationMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub summary: String,
    pub progress: String,
}

#[derive(Clone)]
pub struct Generator {
    client: Arc<dyn ModelClient>,
    config: GenerationConfig,
    activity: Option<Arc<ActivityLog>>,
}

impl Generator {
    pub fn new(client: Arc<dyn ModelClient>, config: GenerationConfig) -> Self {
        Self {
            client,
            config,
            activity: None,
        }
    }

    /// Record every raw model response in the activity log.
    pub fn with_activity_log(mut self, activity: Arc<ActivityLog>) -> Self {
        self.activity = Some(activity);
        self
    }

    pub async fn generate(&self, form: BreakdownForm) -> Result<GenerationOutcome, BreakdownError> {
        let request = form.validate()?;
        self.generate_request(&request).await
    }

    pub async fn generate_request(
        &self,
        request: &BreakdownRequest,
    ) -> Result<GenerationOutcome, BreakdownError> {
        let sizing = request.sizing();
        if sizing.total_weeks > self.config.max_weeks {
            return Err(BreakdownError::TooLarge {
                weeks: sizing.total_weeks,
                max: self.config.max_weeks,
            });
        }

        tracing::info!(
            "Generating {} {} units for goal ({} hours total)",
            sizing.unit_count,
            request.granularity().as_str(),
            sizing.total_hours
        );

        if sizing.unit_count <= self.config.chunk_threshold {
            self.single_shot(request, &sizing).await
        } else {
            Ok(self.chunked(request, &sizing).await)
        }
    }

    async fn single_shot(
        &self,
        request: &BreakdownRequest,
        sizing: &PlanSizing,
    ) -> Result<GenerationOutcome, BreakdownError> {
        let expected = sizing.unit_count;
        let raw = self.call_model(request, sizing, None, SINGLE_SHOT_MAX_TOKENS).await?;
        let recovered = recover_breakdown(&raw)?.breakdown.units;

        if recovered.len() > expected {
            tracing::debug!("Model returned {} units, keeping {}", recovered.len(), expected);
        }
        let mut units = relabel_fallbacks(recovered, request.granularity(), 1, expected);

        let produced = units.len();
        let mut padded = false;
        if produced < expected {
            if produced >= self.config.min_partial_units.min(expected) {
                tracing::warn!(
                    "Model returned {} of {} units, accepting partial plan",
                    produced,
                    expected
                );
            } else {
                tracing::warn!(
                    "Model returned {} of {} units, padding with fallback units",
                    produced,
                    expected
                );
                units.extend(fallback_range(request.granularity(), produced + 1, expected));
                padded = true;
            }
        }

        let breakdown = Breakdown::new(units);
        let status = if padded {
            GenerationStatus::Fallback
        } else if breakdown.fallback_count() > 0 {
            status_from_fallbacks(&breakdown)
        } else if produced < expected {
            GenerationStatus::PartialSuccess
        } else {
            GenerationStatus::Success
        };

        Ok(outcome(breakdown, status, expected, GenerationMode::SingleShot))
    }

    async fn chunked(&self, request: &BreakdownRequest, sizing: &PlanSizing) -> GenerationOutcome {
        let total = sizing.unit_count;
        let batch_size = self.config.batch_size.max(1);
        let mut units = Vec::with_capacity(total);

        tracing::info!(
            "Plan has {} units, generating in batches of {}",
            total,
            batch_size
        );

        for (batch, start) in (1..=total).step_by(batch_size).enumerate() {
            if batch > 0 && !self.config.batch_delay.is_zero() {
                tokio::time::sleep(self.config.batch_delay).await;
            }
            let end = (start + batch_size - 1).min(total);
            let chunk = self.generate_batch(request, sizing, start, end).await;
            units.extend(chunk.units);
        }

        let breakdown = Breakdown::new(units);
        let status = status_from_fallbacks(&breakdown);
        outcome(breakdown, status, total, GenerationMode::Chunked)
    }

    /// One batch of a chunked plan. Never fails: any problem turns into
    /// fallback units for the affected periods.
    async fn generate_batch(
        &self,
        request: &BreakdownRequest,
        sizing: &PlanSizing,
        start: usize,
        end: usize,
    ) -> ChunkResult {
        let granularity = request.granularity();
        let mut chunk = ChunkResult {
            range_start: start,
            range_end: end,
            units: Vec::new(),
        };
        let expected = chunk.expected_len();

        let raw = match self
            .call_model(request, sizing, Some((start, end)), BATCH_MAX_TOKENS)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Batch {}-{} failed: {}", start, end, e);
                self.log_error(&format!("batch {start}-{end} model call failed: {e}"))
                    .await;
                chunk.units = fallback_range(granularity, start, end);
                return chunk;
            }
        };

        let units = match recover_breakdown(&raw) {
            Ok(repaired) => repaired.breakdown.units,
            Err(e) => {
                tracing::warn!("Batch {}-{} response unusable: {}", start, end, e);
                self.log_error(&format!("batch {start}-{end} response unusable: {e}"))
                    .await;
                chunk.units = fallback_range(granularity, start, end);
                return chunk;
            }
        };

        if units.len() != expected {
            tracing::warn!(
                "Batch {}-{} returned {} units, expected {}",
                start,
                end,
                units.len(),
                expected
            );
        }

        chunk.units = relabel_fallbacks(units, granularity, start, expected);

        let produced = chunk.units.len();
        chunk
            .units
            .extend(fallback_range(granularity, start + produced, end));
        chunk
    }

    async fn call_model(
        &self,
        request: &BreakdownRequest,
        sizing: &PlanSizing,
        range: Option<(usize, usize)>,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let completion = CompletionRequest::structured(
            breakdown_system_prompt(),
            breakdown_user_prompt(request, sizing, range),
            max_tokens,
        );
        let raw = self.client.complete(&completion).await?;

        if let Some(activity) = &self.activity {
            activity.record(EntryKind::ModelResponse, &raw).await;
        }
        Ok(raw)
    }

    async fn log_error(&self, message: &str) {
        if let Some(activity) = &self.activity {
            activity.record(EntryKind::Error, message).await;
        }
    }

    /// One short sentence describing the plan.
    pub async fn summarize(&self, breakdown: &Breakdown) -> Result<Summary, BreakdownError> {
        let (system, user) = summary_prompts(&render_text(breakdown));
        let completion = CompletionRequest::prose(system, user, SUMMARY_MAX_TOKENS);

        let summary = self.client.complete(&completion).await?.trim().to_string();
        if summary.is_empty() {
            return Err(BreakdownError::EmptySummary);
        }

        Ok(Summary {
            summary,
            progress: SUMMARY_PROGRESS.to_string(),
        })
    }
}

/// Keeps at most `limit` units and renumbers repair-chain placeholders to the
/// request's granularity, counting from `first`.
fn relabel_fallbacks(
    units: Vec<PlanUnit>,
    granularity: Granularity,
    first: usize,
    limit: usize,
) -> Vec<PlanUnit> {
    units
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(offset, unit)| {
            if unit.is_fallback() {
                make_fallback_unit(granularity, first + offset)
            } else {
                unit
            }
        })
        .collect()
}

fn status_from_fallbacks(breakdown: &Breakdown) -> GenerationStatus {
    match breakdown.fallback_count() {
        0 => GenerationStatus::Success,
        n if n == breakdown.len() => GenerationStatus::Fallback,
        _ => GenerationStatus::PartialSuccess,
    }
}

fn outcome(
    breakdown: Breakdown,
    status: GenerationStatus,
    expected_units: usize,
    mode: GenerationMode,
) -> GenerationOutcome {
    GenerationOutcome {
        fallback_units: breakdown.fallback_count(),
        breakdown,
        status,
        expected_units,
        mode,
    }
}
