//! Shared types used across modules
//!
//! The playbook document model: bullets, their feedback log, proposed deltas
//! and the playbook container. Field names serialize in camelCase so the
//! YAML store stays readable and hand-editable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current on-disk schema version
pub const SCHEMA_VERSION: u32 = 2;

/// Whether a bullet prescribes or warns against something
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BulletType {
    #[default]
    Rule,
    AntiPattern,
}

impl std::fmt::Display for BulletType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BulletType::Rule => write!(f, "rule"),
            BulletType::AntiPattern => write!(f, "anti-pattern"),
        }
    }
}

/// Which store a bullet belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BulletScope {
    #[default]
    Global,
    Workspace,
}

impl std::fmt::Display for BulletScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BulletScope::Global => write!(f, "global"),
            BulletScope::Workspace => write!(f, "workspace"),
        }
    }
}

/// Administrative state of a bullet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BulletState {
    #[default]
    Active,
    Deprecated,
    Retired,
}

impl std::fmt::Display for BulletState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BulletState::Active => write!(f, "active"),
            BulletState::Deprecated => write!(f, "deprecated"),
            BulletState::Retired => write!(f, "retired"),
        }
    }
}

/// Lifecycle stage derived from the decayed feedback signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Maturity {
    #[default]
    Candidate,
    Established,
    Proven,
    Deprecated,
}

impl std::fmt::Display for Maturity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Maturity::Candidate => write!(f, "candidate"),
            Maturity::Established => write!(f, "established"),
            Maturity::Proven => write!(f, "proven"),
            Maturity::Deprecated => write!(f, "deprecated"),
        }
    }
}

/// Direction of a feedback event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    Helpful,
    Harmful,
}

impl std::fmt::Display for FeedbackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedbackKind::Helpful => write!(f, "helpful"),
            FeedbackKind::Harmful => write!(f, "harmful"),
        }
    }
}

/// Why a bullet was marked harmful
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarmfulReason {
    CausedBug,
    WastedTime,
    ContradictedRequirements,
    WrongContext,
    Outdated,
    Other,
}

impl HarmfulReason {
    /// Parse a user supplied reason, falling back to `Other`
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "caused_bug" => HarmfulReason::CausedBug,
            "wasted_time" => HarmfulReason::WastedTime,
            "contradicted_requirements" => HarmfulReason::ContradictedRequirements,
            "wrong_context" => HarmfulReason::WrongContext,
            "outdated" => HarmfulReason::Outdated,
            _ => HarmfulReason::Other,
        }
    }
}

impl std::fmt::Display for HarmfulReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HarmfulReason::CausedBug => write!(f, "caused_bug"),
            HarmfulReason::WastedTime => write!(f, "wasted_time"),
            HarmfulReason::ContradictedRequirements => write!(f, "contradicted_requirements"),
            HarmfulReason::WrongContext => write!(f, "wrong_context"),
            HarmfulReason::Outdated => write!(f, "outdated"),
            HarmfulReason::Other => write!(f, "other"),
        }
    }
}

/// A single immutable feedback observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackEvent {
    #[serde(rename = "type")]
    pub kind: FeedbackKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<HarmfulReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Strength of an implicit signal; recorded for audit only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

impl FeedbackEvent {
    pub fn new(kind: FeedbackKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            timestamp,
            session_path: None,
            reason: None,
            context: None,
            weight: None,
        }
    }

    pub fn with_session(mut self, session: Option<String>) -> Self {
        self.session_path = session;
        self
    }

    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }

    pub fn with_reason(mut self, reason: Option<HarmfulReason>) -> Self {
        self.reason = reason;
        self
    }
}

fn default_half_life() -> f64 {
    90.0
}

/// A persisted rule or anti-pattern entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bullet {
    pub id: String,
    pub content: String,
    pub category: String,
    #[serde(rename = "type", default)]
    pub bullet_type: BulletType,
    #[serde(default)]
    pub scope: BulletScope,
    #[serde(default)]
    pub state: BulletState,
    #[serde(default)]
    pub maturity: Maturity,
    /// Rule phrased as a prohibition ("never ..."), inverted by deprecation only
    #[serde(default)]
    pub is_negative: bool,
    #[serde(default)]
    pub feedback_events: Vec<FeedbackEvent>,
    /// Legacy counters, derived from the event log and never authoritative
    #[serde(default)]
    pub helpful_count: u32,
    #[serde(default)]
    pub harmful_count: u32,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned_reason: Option<String>,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecation_reason: Option<String>,
    /// Id of the successor bullet (back-reference only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaced_by: Option<String>,
    #[serde(default = "default_half_life")]
    pub decay_half_life_days: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub source_sessions: Vec<String>,
    #[serde(default)]
    pub source_agents: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bullet {
    /// Whether the bullet still participates in context and scoring
    pub fn is_active(&self) -> bool {
        !self.deprecated
            && self.state == BulletState::Active
            && self.maturity != Maturity::Deprecated
    }

    pub fn is_anti_pattern(&self) -> bool {
        self.bullet_type == BulletType::AntiPattern
    }

    /// Add a tag, keeping the tag list free of duplicates
    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
    }

    /// Most recent feedback timestamp, if any
    pub fn last_feedback_at(&self) -> Option<DateTime<Utc>> {
        self.feedback_events.iter().map(|e| e.timestamp).max()
    }
}

/// Fields an `add` delta may carry for a new bullet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBullet {
    pub content: String,
    pub category: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub bullet_type: Option<BulletType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<BulletScope>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_negative: bool,
}

impl NewBullet {
    pub fn new(content: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            category: category.into(),
            bullet_type: None,
            scope: None,
            tags: Vec::new(),
            is_negative: false,
        }
    }
}

/// A proposed mutation to a playbook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum Delta {
    Add {
        bullet: NewBullet,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_session: Option<String>,
    },
    Helpful {
        bullet_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_session: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<String>,
    },
    Harmful {
        bullet_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_session: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<HarmfulReason>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<String>,
    },
    Replace {
        bullet_id: String,
        new_content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Deprecate {
        bullet_id: String,
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        replaced_by: Option<String>,
    },
    Merge {
        bullet_ids: Vec<String>,
        merged_content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl Delta {
    /// Short name of the variant, as serialized
    pub fn kind(&self) -> &'static str {
        match self {
            Delta::Add { .. } => "add",
            Delta::Helpful { .. } => "helpful",
            Delta::Harmful { .. } => "harmful",
            Delta::Replace { .. } => "replace",
            Delta::Deprecate { .. } => "deprecate",
            Delta::Merge { .. } => "merge",
        }
    }

    /// The existing bullet this delta targets, for single-target variants
    pub fn target_id(&self) -> Option<&str> {
        match self {
            Delta::Helpful { bullet_id, .. }
            | Delta::Harmful { bullet_id, .. }
            | Delta::Replace { bullet_id, .. }
            | Delta::Deprecate { bullet_id, .. } => Some(bullet_id),
            Delta::Merge { bullet_ids, .. } => bullet_ids.first().map(String::as_str),
            Delta::Add { .. } => None,
        }
    }
}

/// Audit record of a retired pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeprecatedPattern {
    pub pattern: String,
    pub deprecated_at: DateTime<Utc>,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybookMetadata {
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reflection: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_reflections: u64,
    #[serde(default)]
    pub total_sessions_processed: u64,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

fn default_playbook_name() -> String {
    "playbook".to_string()
}

fn default_playbook_description() -> String {
    "Auto-generated from agent session reflections".to_string()
}

/// The persisted bullet collection for one scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playbook {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default = "default_playbook_name")]
    pub name: String,
    #[serde(default = "default_playbook_description")]
    pub description: String,
    pub metadata: PlaybookMetadata,
    #[serde(default)]
    pub deprecated_patterns: Vec<DeprecatedPattern>,
    #[serde(default)]
    pub bullets: Vec<Bullet>,
}

impl Playbook {
    /// Create an empty playbook stamped with the given time
    pub fn empty(name: &str, now: DateTime<Utc>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            name: name.to_string(),
            description: default_playbook_description(),
            metadata: PlaybookMetadata {
                created_at: now,
                last_reflection: None,
                total_reflections: 0,
                total_sessions_processed: 0,
            },
            deprecated_patterns: Vec::new(),
            bullets: Vec::new(),
        }
    }
}
