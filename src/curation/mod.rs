//! Delta curation: validation, evidence checks, deduplication, conflict checks and application

pub mod conflicts;
pub mod curator;
pub mod dedup;
pub mod evidence;
pub mod similarity;
pub mod validate;

pub use conflicts::{detect_conflicts, Conflict, CONFLICT_OVERLAP_THRESHOLD};
pub use curator::{
    curate_playbook, ConflictReport, CurationResult, Curator, DecisionAction, DecisionLogEntry,
    DecisionPhase, Inversion, Promotion,
};
pub use dedup::deduplicate_deltas;
pub use evidence::{evidence_gate, EvidenceReport, EvidenceVerdict};
pub use validate::validate_delta;
