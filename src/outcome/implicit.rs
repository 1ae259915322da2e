//! Implicit feedback from observed task outcomes

use serde::{Deserialize, Serialize};

use crate::types::FeedbackKind;

/// Runs shorter than this count as fast
pub const FAST_THRESHOLD_SECS: u64 = 600;
/// Runs longer than this count as slow
pub const SLOW_THRESHOLD_SECS: u64 = 3600;

const MIN_WEIGHT: f64 = 0.1;
const MAX_WEIGHT: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Failure,
    Partial,
    Mixed,
}

impl std::str::FromStr for OutcomeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "success" => Ok(OutcomeStatus::Success),
            "failure" => Ok(OutcomeStatus::Failure),
            "partial" => Ok(OutcomeStatus::Partial),
            "mixed" => Ok(OutcomeStatus::Mixed),
            other => Err(format!("unknown outcome status '{}'", other)),
        }
    }
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutcomeStatus::Success => write!(f, "success"),
            OutcomeStatus::Failure => write!(f, "failure"),
            OutcomeStatus::Partial => write!(f, "partial"),
            OutcomeStatus::Mixed => write!(f, "mixed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl std::str::FromStr for Sentiment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "positive" => Ok(Sentiment::Positive),
            "negative" => Ok(Sentiment::Negative),
            "neutral" => Ok(Sentiment::Neutral),
            other => Err(format!("unknown sentiment '{}'", other)),
        }
    }
}

/// What was observed about one task run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeSignals {
    pub outcome: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_count: Option<u32>,
    #[serde(default)]
    pub had_retries: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Sentiment>,
}

impl OutcomeSignals {
    pub fn new(outcome: OutcomeStatus) -> Self {
        Self {
            outcome,
            duration_secs: None,
            error_count: None,
            had_retries: false,
            sentiment: None,
        }
    }
}

/// A synthesized feedback signal
#[derive(Debug, Clone, PartialEq)]
pub struct ImplicitFeedback {
    pub kind: FeedbackKind,
    /// Signal strength in `[0.1, 2.0]`
    pub weight: f64,
    /// Comma separated list of the signals that fired
    pub context: String,
}

/// Turn outcome signals into a helpful or harmful signal.
///
/// Returns `None` when the helpful and harmful sides tie, which covers runs
/// with no usable signal as well as unqualified mixed or partial outcomes.
pub fn score_implicit_feedback(signals: &OutcomeSignals) -> Option<ImplicitFeedback> {
    let mut helpful = 0.0_f64;
    let mut harmful = 0.0_f64;
    let mut reasons: Vec<&str> = Vec::new();

    match signals.outcome {
        OutcomeStatus::Success => {
            helpful += 1.0;
            reasons.push("success");
        }
        OutcomeStatus::Failure => {
            harmful += 1.0;
            reasons.push("failure");
        }
        OutcomeStatus::Partial => reasons.push("partial"),
        OutcomeStatus::Mixed => reasons.push("mixed"),
    }

    if let Some(duration) = signals.duration_secs {
        if duration > 0 && duration < FAST_THRESHOLD_SECS && signals.outcome != OutcomeStatus::Failure {
            helpful += 0.5;
            reasons.push("fast");
        } else if duration > SLOW_THRESHOLD_SECS {
            harmful += 0.3;
            reasons.push("slow");
        }
    }

    match signals.error_count {
        Some(n) if n >= 2 => {
            harmful += 0.7;
            reasons.push("errors>=2");
        }
        Some(1) => {
            harmful += 0.3;
            reasons.push("error");
        }
        _ => {}
    }

    if signals.had_retries {
        harmful += 0.5;
        reasons.push("retries");
    }

    match signals.sentiment {
        Some(Sentiment::Positive) => {
            helpful += 0.3;
            reasons.push("sentiment+");
        }
        Some(Sentiment::Negative) => {
            harmful += 0.5;
            reasons.push("sentiment-");
        }
        _ => {}
    }

    let (kind, strength) = if helpful > harmful {
        (FeedbackKind::Helpful, helpful)
    } else if harmful > helpful {
        (FeedbackKind::Harmful, harmful)
    } else {
        return None;
    };

    Some(ImplicitFeedback {
        kind,
        weight: strength.clamp(MIN_WEIGHT, MAX_WEIGHT),
        context: reasons.join(", "),
    })
}
