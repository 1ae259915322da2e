//! Playbook storage
//!
//! In-memory mutation helpers, crash-safe persistence, the read-only merged
//! view and the locked [`BulletStore`] entry points.

pub mod blocked;
pub mod bullets;
pub mod export;
pub mod merge;
pub mod persist;
pub mod store;

pub use blocked::{append_blocked, is_blocked, load_blocked, BlockedEntry};
pub use bullets::{
    active_bullets, add_bullet, bullets_by_category, deprecate_bullet, find_bullet, find_bullet_mut,
    generate_bullet_id, record_feedback,
};
pub use export::{compute_stats, export_markdown, PlaybookStats};
pub use merge::{load_merged, merge_playbooks};
pub use persist::{load, load_playbook, save_playbook, LoadOutcome, Recovery, RecoverySource};
pub use store::{BulletStore, FeedbackBatchOutcome, FeedbackItem, ForgetOutcome};
