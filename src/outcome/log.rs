//! Append-only JSON-lines log of task outcomes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::Result;

use super::implicit::OutcomeSignals;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeRecord {
    pub session_id: String,
    #[serde(flatten)]
    pub signals: OutcomeSignals,
    /// Bullet ids that were in context for the run
    #[serde(default)]
    pub rules_used: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl OutcomeRecord {
    pub fn new(session_id: impl Into<String>, signals: OutcomeSignals, rules_used: Vec<String>) -> Self {
        Self {
            session_id: session_id.into(),
            signals,
            rules_used,
            task: None,
            notes: None,
            recorded_at: Utc::now(),
        }
    }
}

/// Append one record, creating the log and its directory if needed
pub fn record_outcome(path: &Path, record: &OutcomeRecord) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut line = serde_json::to_string(record)?;
    line.push('\n');
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    debug!("Recorded outcome for session {}", record.session_id);
    Ok(())
}

/// The last `limit` records, oldest first. Malformed lines are skipped.
pub fn load_outcomes(path: &Path, limit: usize) -> Result<Vec<OutcomeRecord>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let start = lines.len().saturating_sub(limit);
    Ok(lines[start..]
        .iter()
        .filter_map(|line| match serde_json::from_str::<OutcomeRecord>(line) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skipping malformed outcome record: {}", e);
                None
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::implicit::OutcomeStatus;

    fn record(session: &str) -> OutcomeRecord {
        OutcomeRecord::new(session, OutcomeSignals::new(OutcomeStatus::Success), vec!["b-1".into()])
    }

    #[test]
    fn test_round_trip_with_tail_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("outcomes.jsonl");
        for session in ["s1", "s2", "s3"] {
            record_outcome(&path, &record(session)).unwrap();
        }

        let all = load_outcomes(&path, 100).unwrap();
        assert_eq!(all.len(), 3);
        let tail = load_outcomes(&path, 2).unwrap();
        assert_eq!(tail.iter().map(|r| r.session_id.as_str()).collect::<Vec<_>>(), vec!["s2", "s3"]);
    }

    #[test]
    fn test_wire_format_is_flat() {
        let json = serde_json::to_value(record("s1")).unwrap();
        assert_eq!(json["sessionId"], "s1");
        assert_eq!(json["outcome"], "success");
        assert_eq!(json["rulesUsed"][0], "b-1");
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outcomes.jsonl");
        record_outcome(&path, &record("s1")).unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"{\"sessionId\": 3}\n")
            .unwrap();
        assert_eq!(load_outcomes(&path, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_outcomes(&dir.path().join("none.jsonl"), 10).unwrap().is_empty());
    }
}
