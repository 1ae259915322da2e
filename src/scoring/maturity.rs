//! Maturity classification, promotion/demotion checks and staleness

use chrono::{DateTime, Duration, Utc};

use crate::config::ScoringConfig;
use crate::types::{Bullet, Maturity};

use super::decay::{decayed_counts, effective_score};

/// Tolerance for comparing decayed sums against integer thresholds
const EPSILON: f64 = 0.01;

/// Outcome of a demotion check. The caller applies the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemotionCheck {
    /// Keep the current maturity
    Keep,
    /// Step down one stage
    Demote(Maturity),
    /// Effective score fell below `-prune_harmful_threshold`
    AutoDeprecate,
}

/// Maturity implied by the current decayed signal.
///
/// Deprecated bullets stay deprecated. Below `min_feedback_for_active` total
/// decayed feedback a bullet is a candidate; with enough helpful signal and a
/// low harmful ratio it is proven; otherwise established.
pub fn maturity_state(bullet: &Bullet, config: &ScoringConfig, now: DateTime<Utc>) -> Maturity {
    if bullet.deprecated || bullet.maturity == Maturity::Deprecated {
        return Maturity::Deprecated;
    }

    let counts = decayed_counts(bullet, config, now);
    let total = if counts.total() > EPSILON { counts.total() } else { 0.0 };
    let harmful_ratio = if total > 0.0 { counts.harmful / total } else { 0.0 };

    if total < config.min_feedback_for_active - EPSILON {
        return Maturity::Candidate;
    }
    if counts.helpful >= config.min_helpful_for_proven - EPSILON
        && harmful_ratio <= config.max_harmful_ratio_for_proven
    {
        return Maturity::Proven;
    }
    Maturity::Established
}

/// Forward-only promotion: candidate -> established/proven, established -> proven
pub fn check_for_promotion(bullet: &Bullet, config: &ScoringConfig, now: DateTime<Utc>) -> Maturity {
    let current = bullet.maturity;
    if matches!(current, Maturity::Proven | Maturity::Deprecated) {
        return current;
    }
    let next = maturity_state(bullet, config, now);
    let promoted = match current {
        Maturity::Candidate => matches!(next, Maturity::Established | Maturity::Proven),
        Maturity::Established => next == Maturity::Proven,
        _ => false,
    };
    if promoted { next } else { current }
}

/// Decide whether a bullet should lose standing. Pinned bullets are exempt.
pub fn check_for_demotion(bullet: &Bullet, config: &ScoringConfig, now: DateTime<Utc>) -> DemotionCheck {
    if bullet.pinned || bullet.maturity == Maturity::Deprecated {
        return DemotionCheck::Keep;
    }

    let score = effective_score(bullet, config, now);
    if score < -config.prune_harmful_threshold {
        return DemotionCheck::AutoDeprecate;
    }
    if score < 0.0 {
        match bullet.maturity {
            Maturity::Proven => return DemotionCheck::Demote(Maturity::Established),
            Maturity::Established => return DemotionCheck::Demote(Maturity::Candidate),
            _ => {}
        }
    }
    DemotionCheck::Keep
}

/// True when no feedback landed within `days` and the bullet is at least that old.
/// Windows too large for a `Duration` never expire.
pub fn is_stale(bullet: &Bullet, days: i64, now: DateTime<Utc>) -> bool {
    let window = Duration::try_days(days.max(0)).unwrap_or(Duration::MAX);
    let recent_feedback = bullet
        .feedback_events
        .iter()
        .any(|e| now - e.timestamp < window);
    !recent_feedback && now - bullet.created_at >= window
}

/// Whole days since the last feedback event, or since creation without feedback
pub fn days_since_last_feedback(bullet: &Bullet, now: DateTime<Utc>) -> i64 {
    let since = bullet.last_feedback_at().unwrap_or(bullet.created_at);
    (now - since).num_days().max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::test_support::{bullet_with_events, event_days_ago};
    use crate::types::FeedbackKind;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_no_feedback_stays_candidate() {
        let now = now();
        let bullet = bullet_with_events(now, &[]);
        let config = ScoringConfig::default();
        assert_eq!(maturity_state(&bullet, &config, now), Maturity::Candidate);
        assert_eq!(check_for_promotion(&bullet, &config, now), Maturity::Candidate);
        assert_eq!(check_for_demotion(&bullet, &config, now), DemotionCheck::Keep);
    }

    #[test]
    fn test_established_after_min_feedback() {
        let now = now();
        let config = ScoringConfig::default();
        let bullet = bullet_with_events(now, &[FeedbackKind::Helpful; 3]);
        assert_eq!(maturity_state(&bullet, &config, now), Maturity::Established);
    }

    #[test]
    fn test_ten_helpful_with_long_half_life_is_proven() {
        let now = now();
        let config = ScoringConfig {
            decay_half_life_days: 1000.0,
            min_helpful_for_proven: 10.0,
            ..ScoringConfig::default()
        };
        let bullet = bullet_with_events(now, &[FeedbackKind::Helpful; 10]);
        assert_eq!(maturity_state(&bullet, &config, now), Maturity::Proven);
        assert_eq!(check_for_promotion(&bullet, &config, now), Maturity::Proven);
    }

    #[test]
    fn test_harmful_ratio_blocks_proven() {
        let now = now();
        let config = ScoringConfig::default();
        let mut kinds = vec![FeedbackKind::Helpful; 10];
        kinds.extend([FeedbackKind::Harmful; 3]);
        let bullet = bullet_with_events(now, &kinds);
        assert_eq!(maturity_state(&bullet, &config, now), Maturity::Established);
    }

    #[test]
    fn test_single_harmful_does_not_auto_deprecate() {
        let now = now();
        let config = ScoringConfig::default();
        let mut bullet = bullet_with_events(now, &[FeedbackKind::Harmful]);
        bullet.maturity = Maturity::Established;
        assert_ne!(check_for_demotion(&bullet, &config, now), DemotionCheck::AutoDeprecate);
    }

    #[test]
    fn test_three_harmful_auto_deprecates() {
        let now = now();
        let config = ScoringConfig::default();
        let mut bullet = bullet_with_events(now, &[FeedbackKind::Harmful; 3]);
        bullet.maturity = Maturity::Established;
        assert_eq!(check_for_demotion(&bullet, &config, now), DemotionCheck::AutoDeprecate);
    }

    #[test]
    fn test_pinned_is_exempt_from_demotion() {
        let now = now();
        let config = ScoringConfig::default();
        let mut bullet = bullet_with_events(now, &[FeedbackKind::Harmful; 5]);
        bullet.maturity = Maturity::Established;
        bullet.pinned = true;
        assert_eq!(check_for_demotion(&bullet, &config, now), DemotionCheck::Keep);
    }

    #[test]
    fn test_negative_score_steps_down() {
        let now = now();
        let config = ScoringConfig::default();
        let mut bullet = bullet_with_events(now, &[FeedbackKind::Helpful, FeedbackKind::Harmful]);
        bullet.maturity = Maturity::Proven;
        assert_eq!(
            check_for_demotion(&bullet, &config, now),
            DemotionCheck::Demote(Maturity::Established)
        );
    }

    #[test]
    fn test_promotion_never_goes_backwards() {
        let now = now();
        let config = ScoringConfig::default();
        let mut bullet = bullet_with_events(now, &[]);
        bullet.maturity = Maturity::Established;
        assert_eq!(check_for_promotion(&bullet, &config, now), Maturity::Established);
    }

    #[test]
    fn test_staleness() {
        let now = now();
        let mut bullet = bullet_with_events(now, &[]);
        bullet.created_at = now - Duration::days(120);
        assert!(is_stale(&bullet, 90, now));

        bullet.feedback_events.push(event_days_ago(FeedbackKind::Helpful, now, 10.0));
        assert!(!is_stale(&bullet, 90, now));
        assert_eq!(days_since_last_feedback(&bullet, now), 10);

        let young = bullet_with_events(now, &[]);
        assert!(!is_stale(&young, 90, now));
    }

    #[test]
    fn test_staleness_with_extreme_windows() {
        let now = now();
        let mut bullet = bullet_with_events(now, &[]);
        bullet.created_at = now - Duration::days(120);
        assert!(!is_stale(&bullet, i64::MAX, now));
        assert!(!is_stale(&bullet, 200_000_000_000_000, now));
        assert!(is_stale(&bullet, -5, now));
    }
}
