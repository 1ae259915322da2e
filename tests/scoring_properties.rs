//! Decay and maturity properties over the public scoring API

use agent_playbook::config::ScoringConfig;
use agent_playbook::playbook::add_bullet;
use agent_playbook::scoring::{
    check_for_demotion, check_for_promotion, decayed_value, effective_score, raw_score, DemotionCheck,
};
use agent_playbook::types::{Bullet, BulletScope, FeedbackEvent, FeedbackKind, Maturity, NewBullet, Playbook};
use chrono::{DateTime, Duration, Utc};

fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-09-15T00:00:00Z").unwrap().with_timezone(&Utc)
}

fn bullet(kinds: &[FeedbackKind]) -> Bullet {
    let now = now();
    let mut playbook = Playbook::empty("props", now);
    add_bullet(&mut playbook, NewBullet::new("Write the failing test first", "testing"), BulletScope::Global, None, 90.0, now);
    let mut bullet = playbook.bullets.remove(0);
    bullet.feedback_events = kinds.iter().map(|k| FeedbackEvent::new(*k, now)).collect();
    bullet
}

#[test]
fn test_decay_is_monotonic_in_age() {
    let now = now();
    let mut previous = f64::INFINITY;
    for days in [0, 1, 7, 30, 90, 180, 365, 1000] {
        let event = FeedbackEvent::new(FeedbackKind::Helpful, now - Duration::days(days));
        let value = decayed_value(&event, now, 90.0, 4.0);
        assert!(value <= previous, "value rose at {} days", days);
        previous = value;
    }
}

#[test]
fn test_half_life_points() {
    let now = now();
    let one = FeedbackEvent::new(FeedbackKind::Helpful, now - Duration::days(90));
    let two = FeedbackEvent::new(FeedbackKind::Helpful, now - Duration::days(180));
    assert!((decayed_value(&one, now, 90.0, 4.0) - 0.5).abs() < 1e-9);
    assert!((decayed_value(&two, now, 90.0, 4.0) - 0.25).abs() < 1e-9);

    let harmful = FeedbackEvent::new(FeedbackKind::Harmful, now - Duration::days(90));
    assert!((decayed_value(&harmful, now, 90.0, 4.0) + 2.0).abs() < 1e-9);
}

#[test]
fn test_future_events_clamp_to_now() {
    let now = now();
    let future = FeedbackEvent::new(FeedbackKind::Helpful, now + Duration::days(30));
    assert_eq!(decayed_value(&future, now, 90.0, 4.0), 1.0);
}

#[test]
fn test_default_harmful_thresholds() {
    let config = ScoringConfig::default();
    let now = now();

    let mut once = bullet(&[FeedbackKind::Harmful]);
    once.maturity = Maturity::Established;
    assert!((effective_score(&once, &config, now) + 4.0).abs() < 1e-9);
    assert_ne!(check_for_demotion(&once, &config, now), DemotionCheck::AutoDeprecate);

    let mut thrice = bullet(&[FeedbackKind::Harmful; 3]);
    // Three events of feedback move a candidate to established first
    thrice.maturity = check_for_promotion(&thrice, &config, now);
    assert_eq!(thrice.maturity, Maturity::Established);
    assert!((raw_score(&thrice, &config, now) + 12.0).abs() < 1e-9);
    assert_eq!(check_for_demotion(&thrice, &config, now), DemotionCheck::AutoDeprecate);
}

#[test]
fn test_no_feedback_is_inert() {
    let config = ScoringConfig::default();
    let b = bullet(&[]);
    assert_eq!(effective_score(&b, &config, now()), 0.0);
    assert_eq!(check_for_promotion(&b, &config, now()), Maturity::Candidate);
    assert_eq!(check_for_demotion(&b, &config, now()), DemotionCheck::Keep);
}

#[test]
fn test_ten_fresh_helpful_reach_proven() {
    let config = ScoringConfig {
        decay_half_life_days: 1000.0,
        min_helpful_for_proven: 10.0,
        ..ScoringConfig::default()
    };
    let b = bullet(&[FeedbackKind::Helpful; 10]);
    assert_eq!(check_for_promotion(&b, &config, now()), Maturity::Proven);
}
