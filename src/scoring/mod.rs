//! Decay scoring engine
//!
//! Effective scores and maturity are pure functions of a bullet's feedback
//! log, the scoring config and an explicit `now`. Nothing here mutates a
//! bullet; callers apply whatever transition the checks report.

pub mod decay;
pub mod maturity;

pub use decay::{
    analyze_score_distribution, decay_magnitude, decayed_counts, decayed_value, effective_score,
    maturity_weight, raw_score, DecayedCounts, ScoreDistribution,
};
pub use maturity::{
    check_for_demotion, check_for_promotion, days_since_last_feedback, is_stale, maturity_state,
    DemotionCheck,
};

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, Duration, Utc};

    use crate::types::{Bullet, BulletScope, BulletState, BulletType, FeedbackEvent, FeedbackKind, Maturity};

    pub fn event_days_ago(kind: FeedbackKind, now: DateTime<Utc>, days: f64) -> FeedbackEvent {
        let ms = (days * 86_400_000.0) as i64;
        FeedbackEvent::new(kind, now - Duration::milliseconds(ms))
    }

    /// Candidate rule created at `now` with one event per kind, all timestamped `now`
    pub fn bullet_with_events(now: DateTime<Utc>, kinds: &[FeedbackKind]) -> Bullet {
        Bullet {
            id: "b-test".to_string(),
            content: "Run the full test suite before pushing".to_string(),
            category: "testing".to_string(),
            bullet_type: BulletType::Rule,
            scope: BulletScope::Global,
            state: BulletState::Active,
            maturity: Maturity::Candidate,
            is_negative: false,
            feedback_events: kinds.iter().map(|k| FeedbackEvent::new(*k, now)).collect(),
            helpful_count: 0,
            harmful_count: 0,
            pinned: false,
            pinned_reason: None,
            deprecated: false,
            deprecated_at: None,
            deprecation_reason: None,
            replaced_by: None,
            decay_half_life_days: 90.0,
            tags: Vec::new(),
            source_sessions: Vec::new(),
            source_agents: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}
