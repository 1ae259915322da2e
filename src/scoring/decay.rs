//! Time-decayed feedback values and the effective score
//!
//! Every score is recomputed from the event log; nothing stored on the bullet
//! is trusted as a score.

use chrono::{DateTime, Utc};

use crate::config::ScoringConfig;
use crate::types::{Bullet, FeedbackEvent, FeedbackKind, Maturity};

const MS_PER_DAY: f64 = 86_400_000.0;

/// Decayed sums split by feedback direction, at unit magnitude per event
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DecayedCounts {
    pub helpful: f64,
    pub harmful: f64,
}

impl DecayedCounts {
    pub fn total(&self) -> f64 {
        self.helpful + self.harmful
    }
}

/// Magnitude of one event at `now`: `0.5^(age / half_life)`.
///
/// Future-dated events clamp to age zero, so they count as exactly one event.
pub fn decay_magnitude(event: &FeedbackEvent, now: DateTime<Utc>, half_life_days: f64) -> f64 {
    if !(half_life_days > 0.0) {
        return 0.0;
    }
    let age_days = (now - event.timestamp).num_milliseconds() as f64 / MS_PER_DAY;
    let value = 0.5_f64.powf(age_days.max(0.0) / half_life_days);
    if value.is_finite() { value } else { 0.0 }
}

/// Signed contribution of one event: `+m` when helpful, `-harmful_multiplier * m` when harmful
pub fn decayed_value(
    event: &FeedbackEvent,
    now: DateTime<Utc>,
    half_life_days: f64,
    harmful_multiplier: f64,
) -> f64 {
    let magnitude = decay_magnitude(event, now, half_life_days);
    match event.kind {
        FeedbackKind::Helpful => magnitude,
        FeedbackKind::Harmful => -harmful_multiplier * magnitude,
    }
}

/// Sum decayed magnitudes per direction. The harmful multiplier is not applied here.
pub fn decayed_counts(bullet: &Bullet, config: &ScoringConfig, now: DateTime<Utc>) -> DecayedCounts {
    let half_life = config.decay_half_life_days;
    bullet
        .feedback_events
        .iter()
        .fold(DecayedCounts::default(), |mut acc, event| {
            let m = decay_magnitude(event, now, half_life);
            match event.kind {
                FeedbackKind::Helpful => acc.helpful += m,
                FeedbackKind::Harmful => acc.harmful += m,
            }
            acc
        })
}

/// Weight applied to the raw score by maturity stage
pub fn maturity_weight(maturity: Maturity) -> f64 {
    match maturity {
        Maturity::Candidate => 0.5,
        Maturity::Established => 1.0,
        Maturity::Proven => 1.5,
        Maturity::Deprecated => 0.0,
    }
}

/// Raw decayed score before maturity weighting
pub fn raw_score(bullet: &Bullet, config: &ScoringConfig, now: DateTime<Utc>) -> f64 {
    let counts = decayed_counts(bullet, config, now);
    counts.helpful - config.harmful_multiplier * counts.harmful
}

/// `(helpful - multiplier * harmful) * maturity_weight`
pub fn effective_score(bullet: &Bullet, config: &ScoringConfig, now: DateTime<Utc>) -> f64 {
    raw_score(bullet, config, now) * maturity_weight(bullet.maturity)
}

/// Bucketed view of effective scores across a set of bullets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct ScoreDistribution {
    pub excellent: usize,
    pub good: usize,
    pub neutral: usize,
    pub at_risk: usize,
}

pub fn analyze_score_distribution<'a>(
    bullets: impl IntoIterator<Item = &'a Bullet>,
    config: &ScoringConfig,
    now: DateTime<Utc>,
) -> ScoreDistribution {
    let mut dist = ScoreDistribution::default();
    for bullet in bullets {
        let score = effective_score(bullet, config, now);
        if score >= 10.0 {
            dist.excellent += 1;
        } else if score >= 5.0 {
            dist.good += 1;
        } else if score >= 0.0 {
            dist.neutral += 1;
        } else {
            dist.at_risk += 1;
        }
    }
    dist
}
