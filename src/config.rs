//! Configuration management
//!
//! Manages store locations, scoring constants, curation thresholds and lock
//! timing. Persisted as TOML in the platform config directory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::PlaybookError;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Store and log locations
    #[serde(default)]
    pub paths: PathsConfig,
    /// Decay scoring and maturity thresholds
    #[serde(default)]
    pub scoring: ScoringConfig,
    /// Delta curation settings
    #[serde(default)]
    pub curation: CurationConfig,
    /// Cross-process lock timing
    #[serde(default)]
    pub lock: LockConfig,
    /// Task context retrieval
    #[serde(default)]
    pub context: ContextConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Global playbook (defaults to `<data_dir>/playbook.yaml`)
    #[serde(default)]
    pub global_playbook: Option<PathBuf>,
    /// Workspace playbook, relative paths resolve against the working directory
    #[serde(default = "default_workspace_playbook")]
    pub workspace_playbook: PathBuf,
    /// Forgotten-bullet log (defaults to `<data_dir>/blocked.log`)
    #[serde(default)]
    pub blocked_log: Option<PathBuf>,
    /// Outcome log (defaults to `<data_dir>/outcomes.jsonl`)
    #[serde(default)]
    pub outcome_log: Option<PathBuf>,
}

fn default_workspace_playbook() -> PathBuf {
    PathBuf::from(".playbook").join("playbook.yaml")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            global_playbook: None,
            workspace_playbook: default_workspace_playbook(),
            blocked_log: None,
            outcome_log: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_half_life_days")]
    pub decay_half_life_days: f64,
    #[serde(default = "default_harmful_multiplier")]
    pub harmful_multiplier: f64,
    #[serde(default = "default_min_feedback_for_active")]
    pub min_feedback_for_active: f64,
    #[serde(default = "default_min_helpful_for_proven")]
    pub min_helpful_for_proven: f64,
    #[serde(default = "default_max_harmful_ratio")]
    pub max_harmful_ratio_for_proven: f64,
    #[serde(default = "default_prune_harmful_threshold")]
    pub prune_harmful_threshold: f64,
}

fn default_half_life_days() -> f64 { 90.0 }
fn default_harmful_multiplier() -> f64 { 4.0 }
fn default_min_feedback_for_active() -> f64 { 3.0 }
fn default_min_helpful_for_proven() -> f64 { 10.0 }
fn default_max_harmful_ratio() -> f64 { 0.1 }
fn default_prune_harmful_threshold() -> f64 { 10.0 }

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            decay_half_life_days: default_half_life_days(),
            harmful_multiplier: default_harmful_multiplier(),
            min_feedback_for_active: default_min_feedback_for_active(),
            min_helpful_for_proven: default_min_helpful_for_proven(),
            max_harmful_ratio_for_proven: default_max_harmful_ratio(),
            prune_harmful_threshold: default_prune_harmful_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurationConfig {
    /// Jaccard similarity at which two additions count as the same rule
    #[serde(default = "default_dedup_threshold")]
    pub dedup_similarity_threshold: f64,
    /// Generator rounds per session
    #[serde(default = "default_max_iterations")]
    pub max_reflector_iterations: u32,
    /// Stop asking the generator once this many deltas were collected
    #[serde(default = "default_max_deltas")]
    pub max_deltas_per_reflection: usize,
    /// Longest bullet content accepted from the generator
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
    /// Worker pool size for read-only session scans
    #[serde(default = "default_audit_concurrency")]
    pub audit_concurrency: usize,
    /// Check proposed rules against archived session evidence
    #[serde(default = "default_validation_enabled")]
    pub validation_enabled: bool,
    /// How far back the evidence search looks
    #[serde(default = "default_validation_lookback_days")]
    pub validation_lookback_days: u32,
}

fn default_dedup_threshold() -> f64 { 0.85 }
fn default_max_iterations() -> u32 { 3 }
fn default_max_deltas() -> usize { 20 }
fn default_max_content_chars() -> usize { 2000 }
fn default_audit_concurrency() -> usize { 3 }
fn default_validation_enabled() -> bool { true }
fn default_validation_lookback_days() -> u32 { 90 }

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            dedup_similarity_threshold: default_dedup_threshold(),
            max_reflector_iterations: default_max_iterations(),
            max_deltas_per_reflection: default_max_deltas(),
            max_content_chars: default_max_content_chars(),
            audit_concurrency: default_audit_concurrency(),
            validation_enabled: default_validation_enabled(),
            validation_lookback_days: default_validation_lookback_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Most rules and anti-patterns returned for one task
    #[serde(default = "default_max_bullets_in_context")]
    pub max_bullets: usize,
}

fn default_max_bullets_in_context() -> usize { 50 }

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_bullets: default_max_bullets_in_context(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Marker age after which a lock is reclaimable
    #[serde(default = "default_stale_threshold_ms")]
    pub stale_threshold_ms: u64,
    /// Back-off between acquisition attempts
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Marker refresh period while held
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
}

fn default_stale_threshold_ms() -> u64 { 30_000 }
fn default_retry_delay_ms() -> u64 { 100 }
fn default_max_retries() -> u32 { 20 }
fn default_heartbeat_interval_ms() -> u64 { 10_000 }

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            stale_threshold_ms: default_stale_threshold_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            max_retries: default_max_retries(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
        }
    }
}

impl LockConfig {
    pub fn stale_threshold(&self) -> Duration {
        Duration::from_millis(self.stale_threshold_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

impl Config {
    /// Load configuration from the default location, writing defaults if missing
    pub fn load() -> Result<Self> {
        let config_path = config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Load and validate configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = config_path()?;
        let parent = config_path.parent()
            .context("Config path has no parent")?;

        std::fs::create_dir_all(parent)
            .context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Reject configurations the scoring engine or lock protocol cannot honor
    pub fn validate(&self) -> std::result::Result<(), PlaybookError> {
        let s = &self.scoring;
        if s.decay_half_life_days <= 0.0 {
            return Err(PlaybookError::Config("scoring.decay_half_life_days must be positive".into()));
        }
        if s.harmful_multiplier <= 0.0 {
            return Err(PlaybookError::Config("scoring.harmful_multiplier must be positive".into()));
        }
        if !(0.0..=1.0).contains(&s.max_harmful_ratio_for_proven) {
            return Err(PlaybookError::Config(
                "scoring.max_harmful_ratio_for_proven must be within [0, 1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.curation.dedup_similarity_threshold) {
            return Err(PlaybookError::Config(
                "curation.dedup_similarity_threshold must be within [0, 1]".into(),
            ));
        }
        if self.curation.audit_concurrency == 0 {
            return Err(PlaybookError::Config("curation.audit_concurrency must be at least 1".into()));
        }
        let lock = &self.lock;
        if lock.heartbeat_interval_ms == 0 || lock.heartbeat_interval_ms.saturating_mul(3) > lock.stale_threshold_ms {
            return Err(PlaybookError::Config(format!(
                "lock.heartbeat_interval_ms ({}) must be at most a third of lock.stale_threshold_ms ({})",
                lock.heartbeat_interval_ms, lock.stale_threshold_ms
            )));
        }
        if lock.max_retries == 0 {
            return Err(PlaybookError::Config("lock.max_retries must be at least 1".into()));
        }
        Ok(())
    }

    /// Resolved global playbook path
    pub fn global_playbook_path(&self) -> std::result::Result<PathBuf, PlaybookError> {
        match &self.paths.global_playbook {
            Some(p) => Ok(p.clone()),
            None => Ok(data_dir_typed()?.join("playbook.yaml")),
        }
    }

    /// Resolved workspace playbook path
    pub fn workspace_playbook_path(&self) -> PathBuf {
        self.paths.workspace_playbook.clone()
    }

    pub fn blocked_log_path(&self) -> std::result::Result<PathBuf, PlaybookError> {
        match &self.paths.blocked_log {
            Some(p) => Ok(p.clone()),
            None => Ok(data_dir_typed()?.join("blocked.log")),
        }
    }

    pub fn outcome_log_path(&self) -> std::result::Result<PathBuf, PlaybookError> {
        match &self.paths.outcome_log {
            Some(p) => Ok(p.clone()),
            None => Ok(data_dir_typed()?.join("outcomes.jsonl")),
        }
    }

    /// Configuration rooted in a single directory, used by tests and sandboxes
    pub fn rooted_at(dir: &Path) -> Self {
        let mut config = Config::default();
        config.paths.global_playbook = Some(dir.join("global").join("playbook.yaml"));
        config.paths.workspace_playbook = dir.join("workspace").join(".playbook").join("playbook.yaml");
        config.paths.blocked_log = Some(dir.join("global").join("blocked.log"));
        config.paths.outcome_log = Some(dir.join("global").join("outcomes.jsonl"));
        config
    }
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "agent-playbook", "agent-playbook")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Get the data directory path
pub fn data_dir() -> Result<PathBuf> {
    Ok(data_dir_typed()?)
}

fn data_dir_typed() -> std::result::Result<PathBuf, PlaybookError> {
    let base = directories::ProjectDirs::from("com", "agent-playbook", "agent-playbook")
        .ok_or_else(|| PlaybookError::Config("Failed to get project directories".into()))?;
    Ok(base.data_dir().to_path_buf())
}

/// Get default configuration as TOML string
pub fn default_config_toml() -> String {
    let config = Config::default();
    toml::to_string_pretty(&config).unwrap_or_else(|_| "# Default configuration\n".to_string())
}
