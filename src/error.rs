//! Error taxonomy for the playbook core
//!
//! Only lock timeouts and configuration problems abort an operation. Parse
//! failures and unavailable collaborators are recovered by the callers that
//! see them; these variants exist so the recovery can be logged and reported.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlaybookError {
    /// Invalid or unusable configuration (fatal)
    #[error("configuration error: {0}")]
    Config(String),

    /// The store lock could not be acquired within the retry budget
    #[error("could not acquire lock for {} after {attempts} attempts", path.display())]
    LockTimeout { path: PathBuf, attempts: u32 },

    /// A playbook document could not be parsed
    #[error("failed to parse playbook at {}: {message}", path.display())]
    StoreParse { path: PathBuf, message: String },

    /// An external collaborator (session archive, reflection generator) failed
    #[error("{collaborator} unavailable: {reason}")]
    CollaboratorUnavailable {
        collaborator: &'static str,
        reason: String,
    },

    #[error("bullet not found: {0}")]
    BulletNotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PlaybookError {
    /// Shorthand for a collaborator failure
    pub fn unavailable(collaborator: &'static str, reason: impl Into<String>) -> Self {
        PlaybookError::CollaboratorUnavailable {
            collaborator,
            reason: reason.into(),
        }
    }

    /// Whether callers are expected to degrade rather than abort
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PlaybookError::StoreParse { .. } | PlaybookError::CollaboratorUnavailable { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PlaybookError>;
