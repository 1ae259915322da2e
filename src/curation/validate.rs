//! Shape checks for untrusted deltas
//!
//! A rejection is a normal outcome, reported as a reason string.

use std::collections::HashSet;

use crate::config::CurationConfig;
use crate::types::Delta;

fn check_content(field: &str, text: &str, config: &CurationConfig) -> Result<(), String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(format!("{} is empty", field));
    }
    let chars = trimmed.chars().count();
    if chars > config.max_content_chars {
        return Err(format!(
            "{} is {} characters, limit is {}",
            field, chars, config.max_content_chars
        ));
    }
    if trimmed.chars().any(|c| c.is_control() && c != '\n' && c != '\t') {
        return Err(format!("{} contains control characters", field));
    }
    Ok(())
}

fn check_id(id: &str) -> Result<(), String> {
    if id.trim().is_empty() {
        Err("bullet id is empty".to_string())
    } else {
        Ok(())
    }
}

/// Validate a proposed delta before it reaches curation
pub fn validate_delta(delta: &Delta, config: &CurationConfig) -> Result<(), String> {
    match delta {
        Delta::Add { bullet, .. } => {
            check_content("content", &bullet.content, config)?;
            if bullet.category.trim().is_empty() {
                return Err("category is empty".to_string());
            }
            Ok(())
        }
        Delta::Helpful { bullet_id, .. } | Delta::Harmful { bullet_id, .. } => check_id(bullet_id),
        Delta::Replace { bullet_id, new_content, .. } => {
            check_id(bullet_id)?;
            check_content("new content", new_content, config)
        }
        Delta::Deprecate { bullet_id, .. } => check_id(bullet_id),
        Delta::Merge { bullet_ids, merged_content, .. } => {
            for id in bullet_ids {
                check_id(id)?;
            }
            let distinct: HashSet<&str> = bullet_ids.iter().map(|s| s.as_str()).collect();
            if distinct.len() < 2 {
                return Err("merge needs at least two distinct bullet ids".to_string());
            }
            check_content("merged content", merged_content, config)
        }
    }
}
