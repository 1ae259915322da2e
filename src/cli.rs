//! CLI interface for agent-playbook

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use crate::config::{self, Config};
use crate::outcome::{self, OutcomeRecord, OutcomeSignals, OutcomeStatus, Sentiment};
use crate::playbook::{compute_stats, export_markdown, find_bullet, BulletStore};
use crate::scoring::{days_since_last_feedback, effective_score};
use crate::types::{Delta, FeedbackEvent, FeedbackKind, HarmfulReason};

#[derive(Parser)]
#[command(name = "agent-playbook")]
#[command(about = "Curated, decay-scored playbook of rules learned from agent sessions", long_about = None)]
#[command(version)]
struct Cli {
    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record explicit feedback on a bullet
    Mark {
        /// Bullet id
        id: String,
        #[arg(long, conflicts_with = "harmful", required_unless_present = "harmful")]
        helpful: bool,
        #[arg(long)]
        harmful: bool,
        /// Why it was harmful (caused_bug, wasted_time, contradicted_requirements, wrong_context, outdated, other)
        #[arg(long)]
        reason: Option<String>,
        /// Session the feedback came from
        #[arg(long)]
        session: Option<String>,
        /// Free-text context
        #[arg(long)]
        context: Option<String>,
    },
    /// Retire a bullet and block its content
    Forget {
        id: String,
        #[arg(long)]
        reason: String,
        /// Keep the lesson as an anti-pattern
        #[arg(long)]
        invert: bool,
    },
    /// Curate a JSON file of proposed deltas
    Curate {
        /// Path to a JSON array of deltas
        deltas: PathBuf,
        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Record a task outcome and apply its implicit feedback
    Outcome {
        #[arg(long)]
        session: String,
        /// success, failure, partial or mixed
        #[arg(long)]
        status: OutcomeStatus,
        /// Comma separated bullet ids used during the task
        #[arg(long, value_delimiter = ',')]
        rules: Vec<String>,
        /// Task duration in seconds
        #[arg(long)]
        duration: Option<u64>,
        #[arg(long)]
        errors: Option<u32>,
        #[arg(long)]
        retries: bool,
        /// positive, negative or neutral
        #[arg(long)]
        sentiment: Option<Sentiment>,
        #[arg(long)]
        task: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Show the rules and anti-patterns relevant to a task
    Context {
        /// Task description
        task: String,
        /// Most bullets to return (defaults to context.max_bullets)
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List active bullets without recent feedback
    Stale {
        #[arg(long, default_value = "90", value_parser = clap::value_parser!(i64).range(0..=36500))]
        days: i64,
    },
    /// Show playbook statistics
    Stats,
    /// Export the merged playbook as markdown
    Export,
    /// Show one bullet with its score
    Show { id: String },
    /// Print the active configuration as TOML
    Config {
        /// Print the built-in defaults instead
        #[arg(long)]
        defaults: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

fn emit<T: Serialize>(json: bool, value: &T, human: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value).context("Failed to serialize output")?);
    } else {
        human(value);
    }
    Ok(())
}

/// Run the CLI
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    let store = BulletStore::new(config);

    let registry = store.registry().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let released = registry.release_all();
            if released > 0 {
                eprintln!("Interrupted, released {} lock(s)", released);
            }
            std::process::exit(130);
        }
    });

    let json = cli.json;
    let now = Utc::now();
    match cli.command {
        Commands::Mark { id, helpful, harmful: _, reason, session, context } => {
            let kind = if helpful { FeedbackKind::Helpful } else { FeedbackKind::Harmful };
            let reason = match kind {
                FeedbackKind::Harmful => Some(reason.as_deref().map_or(HarmfulReason::Other, HarmfulReason::parse_lenient)),
                FeedbackKind::Helpful => None,
            };
            let event = FeedbackEvent::new(kind, now)
                .with_session(session)
                .with_reason(reason)
                .with_context(context);
            let outcome = store.mark(&id, event).await?;
            emit(json, &outcome, |o| {
                if o.duplicates.is_empty() {
                    println!("Recorded {} feedback on {}", kind, id);
                } else {
                    println!("{} already has {} feedback from this session", id, kind);
                }
                for inversion in &o.curation.inversions {
                    println!("Inverted {} into anti-pattern {}", inversion.original_id, inversion.anti_pattern_id);
                }
            })?;
        }
        Commands::Forget { id, reason, invert } => {
            let outcome = store.forget(&id, &reason, invert).await?;
            emit(json, &outcome, |o| {
                println!("Forgot {} ({} store)", o.bullet_id, o.scope);
                if let Some(anti) = &o.anti_pattern_id {
                    println!("Anti-pattern: {}", anti);
                }
            })?;
        }
        Commands::Curate { deltas, dry_run } => {
            let text = std::fs::read_to_string(&deltas)
                .with_context(|| format!("Failed to read deltas from {}", deltas.display()))?;
            let parsed: Vec<Delta> = serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse deltas in {}", deltas.display()))?;
            let result = store.curate(&parsed, dry_run).await?;
            emit(json, &result, |r| {
                let prefix = if dry_run { "Would apply" } else { "Applied" };
                println!("{} {} delta(s), skipped {}", prefix, r.applied, r.skipped);
                for c in &r.conflicts {
                    println!("Conflict: {} vs {} ({})", c.bullet_id, c.conflicting_bullet_id, c.reason);
                }
                for i in &r.inversions {
                    println!("Inverted {} into {}", i.original_id, i.anti_pattern_id);
                }
            })?;
        }
        Commands::Outcome { session, status, rules, duration, errors, retries, sentiment, task, notes } => {
            let signals = OutcomeSignals {
                outcome: status,
                duration_secs: duration,
                error_count: errors,
                had_retries: retries,
                sentiment,
            };
            let mut record = OutcomeRecord::new(session, signals, rules);
            record.task = task;
            record.notes = notes;
            outcome::record_outcome(&store.config().outcome_log_path()?, &record)?;
            let applied = outcome::apply_outcome_feedback(&store, std::slice::from_ref(&record)).await?;
            emit(json, &applied, |a| {
                println!("Outcome recorded, feedback applied to {} bullet(s)", a.applied);
                if !a.missing.is_empty() {
                    println!("Unknown bullet ids: {}", a.missing.join(", "));
                }
            })?;
        }
        Commands::Context { task, limit } => {
            let context = store.context(&task, limit)?;
            emit(json, &context, |c| {
                for warning in &c.warnings {
                    println!("Warning: {}", warning);
                }
                if c.rules.is_empty() && c.anti_patterns.is_empty() {
                    println!("No relevant rules for this task");
                }
                if !c.rules.is_empty() {
                    println!("Rules:");
                    for s in &c.rules {
                        println!("  [{}] {} (score {:.2})", s.bullet.id, s.bullet.content, s.final_score);
                    }
                }
                if !c.anti_patterns.is_empty() {
                    println!("Anti-patterns:");
                    for s in &c.anti_patterns {
                        println!("  [{}] {} (score {:.2})", s.bullet.id, s.bullet.content, s.final_score);
                    }
                }
            })?;
        }
        Commands::Stale { days } => {
            let stale = store.stale_bullets(days, now)?;
            emit(json, &stale, |bullets| {
                if bullets.is_empty() {
                    println!("No stale bullets");
                }
                for b in bullets {
                    println!("[{}] {} ({} days without feedback)", b.id, b.content, days_since_last_feedback(b, now));
                }
            })?;
        }
        Commands::Stats => {
            let merged = store.load_merged()?;
            let stats = compute_stats(&merged, &store.config().scoring, now);
            emit(json, &stats, |s| {
                println!("Playbook Statistics");
                println!("===================");
                println!("Bullets: {} ({} active, {} deprecated, {} pinned)", s.total, s.active, s.deprecated, s.pinned);
                for (maturity, count) in &s.by_maturity {
                    println!("  {}: {}", maturity, count);
                }
                println!(
                    "Scores: {} excellent, {} good, {} neutral, {} at risk",
                    s.distribution.excellent, s.distribution.good, s.distribution.neutral, s.distribution.at_risk
                );
                println!("Stale: {}", s.stale);
            })?;
        }
        Commands::Export => {
            let merged = store.load_merged()?;
            print!("{}", export_markdown(&merged, &store.config().scoring, now));
        }
        Commands::Show { id } => {
            let merged = store.load_merged()?;
            let bullet = find_bullet(&merged, &id).with_context(|| format!("Bullet {} not found", id))?;
            let score = effective_score(bullet, &store.config().scoring, now);
            if json {
                let mut value = serde_json::to_value(bullet)?;
                value["effectiveScore"] = serde_json::json!(score);
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("[{}] {}", bullet.id, bullet.content);
                println!("Category: {}  Type: {}  Scope: {}", bullet.category, bullet.bullet_type, bullet.scope);
                println!("Maturity: {}  Score: {:.2}", bullet.maturity, score);
                println!("Feedback: {} helpful / {} harmful", bullet.helpful_count, bullet.harmful_count);
                if let Some(reason) = &bullet.deprecation_reason {
                    println!("Deprecated: {}", reason);
                }
            }
        }
        Commands::Config { defaults } => {
            if defaults {
                print!("{}", config::default_config_toml());
            } else {
                print!("{}", toml::to_string_pretty(store.config()).context("Failed to serialize config")?);
            }
        }
    }
    Ok(())
}
