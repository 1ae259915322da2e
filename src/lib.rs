//! Agent Playbook - curated rule memory for coding agents
//!
//! A persistent playbook of short rules and anti-patterns learned from agent
//! sessions:
//! - Decay-weighted feedback scoring and a maturity lifecycle
//! - Deterministic delta curation with dedup, conflict checks and inversion
//! - Crash-safe YAML stores, global plus per-workspace, merged read-only
//! - Cross-process directory locks with heartbeat and stale reclaim
//! - Implicit feedback from task outcomes
//! - Task context: relevant rules and anti-patterns ranked by score
//!
//! # Example
//!
//! ```ignore
//! use agent_playbook::{BulletStore, Config};
//! use agent_playbook::types::{FeedbackEvent, FeedbackKind};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = BulletStore::new(Config::load()?);
//!     let event = FeedbackEvent::new(FeedbackKind::Helpful, chrono::Utc::now());
//!     store.mark("b-0123456789ab", event).await?;
//!     Ok(())
//! }
//! ```

// Core modules (order matters for cross-module dependencies)
pub mod error;
pub mod types;
pub mod config;
pub mod scoring;
pub mod curation;
pub mod lock;
pub mod playbook;
pub mod cli;

// Feature modules
pub mod context;
pub mod outcome;
pub mod collaborators;
pub mod reflect;

pub use config::Config;
pub use error::{PlaybookError, Result};

pub use curation::{curate_playbook, CurationResult, Curator};

pub use lock::{with_lock, LockGuard, LockRegistry};

pub use playbook::{
    BulletStore,
    FeedbackItem,
    load,
    load_merged,
    save_playbook,
};

pub use context::{build_context, TaskContext};

pub use outcome::{apply_outcome_feedback, score_implicit_feedback};

pub use reflect::reflect_sessions;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
