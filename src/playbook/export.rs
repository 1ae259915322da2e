//! Statistics and markdown export

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;

use crate::config::ScoringConfig;
use crate::scoring::{analyze_score_distribution, effective_score, is_stale, ScoreDistribution};
use crate::types::Playbook;

use super::bullets::bullets_by_category;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybookStats {
    pub total: usize,
    pub active: usize,
    pub deprecated: usize,
    pub pinned: usize,
    pub by_scope: BTreeMap<String, usize>,
    pub by_maturity: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
    pub distribution: ScoreDistribution,
    /// Active bullets without feedback for the staleness window
    pub stale: usize,
}

/// Default staleness window for stats
pub const STALE_DAYS: i64 = 90;

pub fn compute_stats(playbook: &Playbook, config: &ScoringConfig, now: DateTime<Utc>) -> PlaybookStats {
    let mut by_scope = BTreeMap::new();
    let mut by_maturity = BTreeMap::new();
    let mut by_type = BTreeMap::new();
    for bullet in &playbook.bullets {
        *by_scope.entry(bullet.scope.to_string()).or_insert(0) += 1;
        *by_maturity.entry(bullet.maturity.to_string()).or_insert(0) += 1;
        *by_type.entry(bullet.bullet_type.to_string()).or_insert(0) += 1;
    }

    let active: Vec<_> = playbook.bullets.iter().filter(|b| b.is_active()).collect();
    PlaybookStats {
        total: playbook.bullets.len(),
        active: active.len(),
        deprecated: playbook.bullets.len() - active.len(),
        pinned: playbook.bullets.iter().filter(|b| b.pinned).count(),
        by_scope,
        by_maturity,
        by_type,
        distribution: analyze_score_distribution(active.iter().copied(), config, now),
        stale: active.iter().filter(|b| is_stale(b, STALE_DAYS, now)).count(),
    }
}

/// Render active bullets as markdown: rules by category, then anti-patterns
pub fn export_markdown(playbook: &Playbook, config: &ScoringConfig, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}", playbook.name);
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", playbook.description);

    for (category, bullets) in bullets_by_category(playbook) {
        let rules: Vec<_> = bullets.into_iter().filter(|b| !b.is_anti_pattern()).collect();
        if rules.is_empty() {
            continue;
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "## {}", category);
        let _ = writeln!(out);
        for bullet in rules {
            let _ = writeln!(
                out,
                "- [{}] {} _({}, score {:.1})_",
                bullet.id,
                bullet.content,
                bullet.maturity,
                effective_score(bullet, config, now)
            );
        }
    }

    let anti: Vec<_> = playbook
        .bullets
        .iter()
        .filter(|b| b.is_active() && b.is_anti_pattern())
        .collect();
    if !anti.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Anti-patterns");
        let _ = writeln!(out);
        for bullet in anti {
            let _ = writeln!(out, "- [{}] {}", bullet.id, bullet.content);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playbook::bullets::{add_bullet, deprecate_bullet};
    use crate::types::{BulletScope, BulletType, NewBullet};

    fn playbook() -> Playbook {
        let now = Utc::now();
        let mut pb = Playbook::empty("team", now);
        add_bullet(&mut pb, NewBullet::new("Run tests", "testing"), BulletScope::Global, None, 90.0, now);
        add_bullet(&mut pb, NewBullet::new("Use rg", "search"), BulletScope::Workspace, None, 90.0, now);
        let mut anti = NewBullet::new("AVOID: force pushing. Broke main", "git");
        anti.bullet_type = Some(BulletType::AntiPattern);
        add_bullet(&mut pb, anti, BulletScope::Global, None, 90.0, now);
        let old = add_bullet(&mut pb, NewBullet::new("Old rule", "testing"), BulletScope::Global, None, 90.0, now);
        deprecate_bullet(&mut pb, &old, "outdated", None, now);
        pb
    }

    #[test]
    fn test_stats_counts() {
        let stats = compute_stats(&playbook(), &ScoringConfig::default(), Utc::now());
        assert_eq!(stats.total, 4);
        assert_eq!(stats.active, 3);
        assert_eq!(stats.deprecated, 1);
        assert_eq!(stats.by_scope.get("workspace"), Some(&1));
        assert_eq!(stats.by_type.get("anti-pattern"), Some(&1));
        assert_eq!(stats.distribution.neutral, 3);
    }

    #[test]
    fn test_markdown_sections() {
        let md = export_markdown(&playbook(), &ScoringConfig::default(), Utc::now());
        assert!(md.starts_with("# team"));
        assert!(md.contains("## testing"));
        assert!(md.contains("## search"));
        assert!(md.contains("## Anti-patterns"));
        assert!(md.contains("AVOID: force pushing"));
        assert!(!md.contains("Old rule"));
        assert!(!md.contains("## git"));
    }
}
