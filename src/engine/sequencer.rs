//! Variant trial sequencer.
//!
//! Variants run one at a time in ascending name order. The first success ends
//! the sequence; later variants are never started. When every variant fails
//! the terminal state carries the full failure history.

use super::runner::{run_variant, OutcomeStatus, RunEnv, VariantOutcome};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

/// Outcome of the code phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodePhaseResult {
    #[serde(flatten)]
    pub outcome: VariantOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub successful_variant: Option<String>,
    pub total_variants_tried: usize,
    /// Names in the order they were attempted.
    pub tried_variants: Vec<String>,
    /// `"<variant>: <Kind>: <message>"` for every failed attempt, in trial order.
    pub all_errors: Vec<String>,
}

impl CodePhaseResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

enum TrialState {
    Trying,
    Succeeded {
        variant: String,
        outcome: VariantOutcome,
    },
    Exhausted,
}

/// Try `variants` in ascending name order until one succeeds.
///
/// An empty mapping yields a failed result with zero attempts and no errors.
pub async fn run_variants(variants: &BTreeMap<String, String>, env: &RunEnv<'_>) -> CodePhaseResult {
    let start = Instant::now();
    let mut tried = Vec::with_capacity(variants.len());
    let mut errors = Vec::new();
    let mut pending = variants.iter();
    let mut state = TrialState::Trying;

    while let TrialState::Trying = state {
        let Some((name, source)) = pending.next() else {
            state = TrialState::Exhausted;
            break;
        };
        tracing::info!(variant = %name, attempt = tried.len() + 1, "trying code variant");
        tried.push(name.clone());
        let outcome = run_variant(name, source, env).await;
        if outcome.is_success() {
            state = TrialState::Succeeded {
                variant: name.clone(),
                outcome,
            };
        } else {
            let reason = outcome.error.as_deref().unwrap_or("unknown error");
            errors.push(format!("{}: {}", name, reason));
        }
    }

    match state {
        TrialState::Succeeded { variant, outcome } => {
            tracing::info!(variant = %variant, tried = tried.len(), "code variant succeeded");
            CodePhaseResult {
                outcome,
                successful_variant: Some(variant),
                total_variants_tried: tried.len(),
                tried_variants: tried,
                all_errors: errors,
            }
        }
        TrialState::Trying | TrialState::Exhausted => {
            if !tried.is_empty() {
                tracing::warn!(tried = tried.len(), "all code variants failed");
            }
            CodePhaseResult {
                outcome: VariantOutcome {
                    status: OutcomeStatus::Failed,
                    result: serde_json::json!({}),
                    created_files: Vec::new(),
                    execution_time: start.elapsed().as_secs_f64(),
                    error: Some(format!(
                        "All code variants failed. Errors: {}",
                        errors.join("; ")
                    )),
                    stdout: String::new(),
                    suspensions: 0,
                },
                successful_variant: None,
                total_variants_tried: tried.len(),
                tried_variants: tried,
                all_errors: errors,
            }
        }
    }
}
