//! Curation pipeline properties: dedup idempotency, case collapse, determinism

use agent_playbook::curation::deduplicate_deltas;
use agent_playbook::types::{Delta, NewBullet, Playbook};
use agent_playbook::{curate_playbook, Config};
use chrono::{DateTime, Utc};

fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-07-04T10:00:00Z").unwrap().with_timezone(&Utc)
}

fn add(content: &str) -> Delta {
    Delta::Add {
        bullet: NewBullet::new(content, "workflow"),
        reason: None,
        source_session: Some("s1".into()),
    }
}

fn proposals() -> Vec<Delta> {
    vec![
        add("Always run cargo fmt before committing"),
        add("  always run CARGO FMT before   committing "),
        add("Never commit generated lockfiles for libraries"),
        Delta::Helpful { bullet_id: "b-unknown".into(), source_session: Some("s1".into()), context: None },
        Delta::Helpful { bullet_id: "b-unknown".into(), source_session: Some("s1".into()), context: None },
        add("Prefer small, reviewable pull requests"),
    ]
}

#[test]
fn test_dedup_is_idempotent() {
    let once = deduplicate_deltas(&proposals(), &[], 0.85);
    let twice = deduplicate_deltas(&once, &[], 0.85);
    assert_eq!(once, twice);
    assert_eq!(once.len(), 4);
}

#[test]
fn test_case_and_whitespace_variants_collapse() {
    let config = Config::default();
    let mut playbook = Playbook::empty("p", now());
    curate_playbook(&mut playbook, &proposals(), &config, now());
    let fmt_rules = playbook
        .bullets
        .iter()
        .filter(|b| b.content.to_lowercase().contains("cargo fmt"))
        .count();
    assert_eq!(fmt_rules, 1);
}

#[test]
fn test_curation_is_deterministic() {
    let config = Config::default();
    let run = || {
        let mut playbook = Playbook::empty("p", now());
        let result = curate_playbook(&mut playbook, &proposals(), &config, now());
        (playbook, result)
    };
    let (first, first_result) = run();
    let (second, second_result) = run();
    assert_eq!(first, second);
    assert_eq!(first_result, second_result);
    assert_eq!(first_result.applied, 3);
}

#[test]
fn test_missing_target_is_skipped_not_fatal() {
    let config = Config::default();
    let mut playbook = Playbook::empty("p", now());
    let result = curate_playbook(
        &mut playbook,
        &[Delta::Harmful { bullet_id: "b-nope".into(), source_session: None, reason: None, context: None }],
        &config,
        now(),
    );
    assert_eq!(result.applied, 0);
    assert_eq!(result.skipped, 1);
    assert!(playbook.bullets.is_empty());
}

#[test]
fn test_distinct_non_ascii_rules_are_both_kept() {
    let config = Config::default();
    let mut playbook = Playbook::empty("p", now());
    let deltas = vec![add("テストを先に書く"), add("本番に直接デプロイしない")];
    assert_eq!(deduplicate_deltas(&deltas, &[], 0.85).len(), 2);

    let result = curate_playbook(&mut playbook, &deltas, &config, now());
    assert_eq!(result.applied, 2);
    assert_eq!(result.skipped, 0);
    assert_eq!(playbook.bullets.len(), 2);
    assert!(playbook.bullets.iter().all(|b| b.helpful_count == 0));
}
