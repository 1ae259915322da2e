//! Outcome-to-feedback adapter
//!
//! Observed task outcomes become implicit feedback events that go through
//! the same locked batch path as explicit `mark` feedback.

pub mod implicit;
pub mod log;

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::playbook::{BulletStore, FeedbackItem};
use crate::types::{FeedbackEvent, FeedbackKind, HarmfulReason};

pub use implicit::{score_implicit_feedback, ImplicitFeedback, OutcomeSignals, OutcomeStatus, Sentiment};
pub use log::{load_outcomes, record_outcome, OutcomeRecord};

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeApplication {
    pub applied: usize,
    /// Referenced rule ids not present in any store
    pub missing: Vec<String>,
    /// Events skipped because the session already recorded the same signal
    pub duplicates: Vec<String>,
    /// Records that produced no signal
    pub neutral: usize,
}

/// Build the feedback event an outcome implies, if any
pub fn outcome_event(record: &OutcomeRecord) -> Option<FeedbackEvent> {
    let signal = score_implicit_feedback(&record.signals)?;
    let mut event = FeedbackEvent::new(signal.kind, Utc::now())
        .with_session(Some(record.session_id.clone()))
        .with_context(Some(signal.context));
    if signal.kind == FeedbackKind::Harmful {
        event = event.with_reason(Some(HarmfulReason::Other));
    }
    event.weight = Some(signal.weight);
    Some(event)
}

/// Apply the implicit feedback from `records` to every referenced rule
pub async fn apply_outcome_feedback(store: &BulletStore, records: &[OutcomeRecord]) -> Result<OutcomeApplication> {
    let mut result = OutcomeApplication::default();
    let mut items = Vec::new();
    for record in records {
        if record.rules_used.is_empty() {
            continue;
        }
        let Some(event) = outcome_event(record) else {
            result.neutral += 1;
            continue;
        };
        items.extend(
            record
                .rules_used
                .iter()
                .map(|id| FeedbackItem::new(id.clone(), event.clone())),
        );
    }

    if items.is_empty() {
        return Ok(result);
    }

    let batch = store.apply_feedback_batch(items).await?;
    result.applied = batch.applied.len();
    result.missing = batch.missing;
    result.duplicates = batch.duplicates;
    info!(
        applied = result.applied,
        missing = result.missing.len(),
        "Outcome feedback applied"
    );
    Ok(result)
}
