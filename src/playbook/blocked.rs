//! Log of forgotten bullets
//!
//! One JSON object per line. Content matching an entry is hidden from the
//! merged view even if a store still carries it as active.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tracing::warn;

use crate::curation::similarity::{content_hash, jaccard_similarity};
use crate::error::Result;

/// Similarity above which content counts as blocked
pub const BLOCKED_SIMILARITY: f64 = 0.85;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedEntry {
    pub id: String,
    pub content: String,
    pub reason: String,
    pub forgotten_at: DateTime<Utc>,
    /// Anti-pattern created in place of the forgotten bullet; never hidden by this entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaced_by: Option<String>,
}

/// Read all entries, skipping malformed lines. A missing file is empty.
pub fn load_blocked(path: &Path) -> Vec<BlockedEntry> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!("Failed to read blocked log {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<BlockedEntry>(line) {
            Ok(entry) if !entry.id.is_empty() && !entry.content.is_empty() => Some(entry),
            Ok(_) => None,
            Err(_) => {
                let preview: String = line.chars().take(50).collect();
                warn!("Skipping malformed line in blocked log: {}", preview);
                None
            }
        })
        .collect()
}

pub fn append_blocked(path: &Path, entry: &BlockedEntry) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut line = serde_json::to_string(entry)?;
    line.push('\n');
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

/// Whether `content` matches any blocked entry by hash or close similarity
pub fn is_blocked(content: &str, blocked: &[BlockedEntry]) -> bool {
    let hash = content_hash(content);
    blocked.iter().any(|entry| {
        content_hash(&entry.content) == hash || jaccard_similarity(content, &entry.content) > BLOCKED_SIMILARITY
    })
}
